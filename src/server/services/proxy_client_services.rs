use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderName, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use futures::TryStreamExt;
use tracing::{debug, error, warn};

use crate::{
    config::AppConfig,
    server::{
        error::{AuthError, ProxyError},
        services::intranet_services::{MappedUrl, SharedIntranetMapper},
    },
};

/// retries after the first attempt, so 4 requests at most
pub const MAX_RETRIES: u32 = 3;

pub type SharedProxyClient = Arc<ProxyClient>;

/// which network the request should go out on, picked from the path prefix the player used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkClass {
    External,
    Intranet,
}

impl NetworkClass {
    pub fn from_path(path: &str) -> Self {
        if path.starts_with("/intranet/") {
            Self::Intranet
        } else {
            Self::External
        }
    }

    pub fn path_prefix(&self) -> &'static str {
        match self {
            Self::External => "/external",
            Self::Intranet => "/intranet",
        }
    }

    pub fn segment_prefix(&self) -> &'static str {
        match self {
            Self::External => "/external/ts/",
            Self::Intranet => "/intranet/ts/",
        }
    }
}

/// per request state threaded through every attempt of the retry loop
///
/// `build_url` is called before each attempt so a refreshed token gets a fresh signature,
/// `on_retry` runs before the backoff whenever the loop decides to go again
#[async_trait]
pub trait RetryHooks: Send {
    fn build_url(&self) -> String;

    async fn on_retry(&mut self, attempt: u32) -> Result<(), AuthError>;
}

struct PreparedRequest<'a> {
    client: &'a reqwest::Client,
    url: String,
    host: Option<String>,
    mapped: Option<MappedUrl>,
}

/// signed fetches against the video host, either straight out or through an intranet mapping
pub struct ProxyClient {
    external: reqwest::Client,
    // no cert verification, mapped addresses never present a cert for the logical hostname
    intranet: reqwest::Client,
    mapper: SharedIntranetMapper,
    fallback_host: String,
    backoff_unit: Duration,
}

impl ProxyClient {
    pub fn new(config: &AppConfig, mapper: SharedIntranetMapper) -> Self {
        let base_headers = config.upstream_headers();

        let external = reqwest::Client::builder()
            .default_headers(base_headers.clone())
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                error!("failed to build external client, using defaults: {}", e);
                reqwest::Client::new()
            });

        let intranet = reqwest::Client::builder()
            .default_headers(base_headers)
            .timeout(config.intranet_timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap_or_else(|e| {
                error!("failed to build intranet client, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            external,
            intranet,
            mapper,
            fallback_host: config.video_host.clone(),
            backoff_unit: config.retry_backoff,
        }
    }

    fn prepare(&self, class: NetworkClass, url: String) -> PreparedRequest<'_> {
        match class {
            NetworkClass::External => PreparedRequest {
                client: &self.external,
                url,
                host: None,
                mapped: None,
            },
            NetworkClass::Intranet => {
                let host = Some(self.mapper.original_host(&url))
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| self.fallback_host.clone());

                match self.mapper.resolve_url(&url) {
                    Some(mapped) => {
                        debug!("intranet request via {} for {}", mapped.address, host);
                        PreparedRequest {
                            client: &self.intranet,
                            url: mapped.url.clone(),
                            host: Some(host),
                            mapped: Some(mapped),
                        }
                    }
                    None => PreparedRequest {
                        client: &self.intranet,
                        url,
                        host: Some(host),
                        mapped: None,
                    },
                }
            }
        }
    }

    /// the shared retry loop, hands back the first 200 response
    ///
    /// transport errors and 403s are retried with linear backoff, any other status fails right
    /// away. a 403 means the video token went stale so a failing `on_retry` ends the loop there,
    /// after a transport error it is only logged.
    async fn send_with_retry<H>(
        &self,
        class: NetworkClass,
        hooks: &mut H,
        kind: &str,
    ) -> Result<reqwest::Response, ProxyError>
    where
        H: RetryHooks + ?Sized,
    {
        let mut attempt: u32 = 0;

        loop {
            let request = self.prepare(class, hooks.build_url());

            let mut builder = request.client.get(&request.url);
            if let Some(host) = &request.host {
                builder = builder.header(header::HOST, host);
            }

            match builder.send().await {
                Err(e) => {
                    if let Some(mapped) = &request.mapped {
                        if e.is_connect() || e.is_timeout() {
                            self.mapper.mark_failed(&mapped.address, &mapped.domain);
                        }
                    }

                    if attempt >= MAX_RETRIES {
                        error!("{} request failed after {} retries: {}", kind, MAX_RETRIES, e);
                        return Err(ProxyError::Transport(e));
                    }

                    warn!("{} request attempt {} failed: {}", kind, attempt + 1, e);
                    if let Err(refresh_err) = hooks.on_retry(attempt).await {
                        warn!("token refresh after transport failure failed: {}", refresh_err);
                    }
                }
                Ok(response) if response.status() == StatusCode::OK => {
                    debug!("{} request succeeded on attempt {}", kind, attempt + 1);
                    return Ok(response);
                }
                Ok(response) if response.status() == StatusCode::FORBIDDEN => {
                    if attempt >= MAX_RETRIES {
                        error!("{} request still forbidden after {} retries", kind, MAX_RETRIES);
                        return Err(ProxyError::UpstreamStatus(StatusCode::FORBIDDEN));
                    }

                    drop(response);
                    warn!("{} request got 403, refreshing token (attempt {})", kind, attempt + 1);
                    hooks.on_retry(attempt).await?;
                }
                Ok(response) => {
                    error!("{} request failed with status {}", kind, response.status());
                    return Err(ProxyError::UpstreamStatus(response.status()));
                }
            }

            tokio::time::sleep(self.backoff_unit * (attempt + 1)).await;
            attempt += 1;
        }
    }

    /// whole body in memory, for manifests
    pub async fn fetch_with_retry<H>(
        &self,
        class: NetworkClass,
        hooks: &mut H,
    ) -> Result<Bytes, ProxyError>
    where
        H: RetryHooks + ?Sized,
    {
        let response = self.send_with_retry(class, hooks, "M3U8").await?;
        response.bytes().await.map_err(ProxyError::Body)
    }

    /// status and headers copied, body streamed straight through without buffering
    ///
    /// once this returns the player is being fed directly, a failure mid stream just cuts the
    /// body short
    pub async fn relay_with_retry<H>(
        &self,
        class: NetworkClass,
        hooks: &mut H,
    ) -> Result<Response, ProxyError>
    where
        H: RetryHooks + ?Sized,
    {
        let upstream = self.send_with_retry(class, hooks, "TS").await?;

        let status = upstream.status();
        let headers = upstream.headers().clone();

        let stream = upstream
            .bytes_stream()
            .inspect_err(|e| error!("segment relay broke mid stream: {}", e));

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;

        for (name, value) in headers.iter() {
            if is_hop_by_hop(name) {
                continue;
            }
            response.headers_mut().append(name.clone(), value.clone());
        }

        Ok(response)
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == header::CONNECTION || name == header::TRANSFER_ENCODING || name.as_str() == "keep-alive"
}
