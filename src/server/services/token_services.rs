use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mockall::automock;
use parking_lot::RwLock;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::server::{
    error::AuthError,
    utils::signature_utils::{Signer, TOKEN_TIMESTAMP_PLACEHOLDER},
};

/// video tokens are only good for a short while upstream, keep them for 10s at most
pub const TOKEN_TTL: Duration = Duration::from_secs(10);

pub type DynTokenIssuer = Arc<dyn TokenIssuerTrait + Send + Sync>;
pub type DynTokenService = Arc<dyn TokenServiceTrait + Send + Sync>;

/// the remote call that turns a login credential into a video token
#[automock]
#[async_trait]
pub trait TokenIssuerTrait {
    async fn issue_video_token(&self, login_token: &str) -> Result<String, AuthError>;
}

#[async_trait]
pub trait TokenServiceTrait {
    /// cached token if it is younger than the ttl, otherwise a fresh one from upstream
    async fn get_token(&self, login_token: &str) -> Result<String, AuthError>;

    /// drops the cached token so the next `get_token` goes to the network
    fn invalidate(&self, login_token: &str);
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    // upstream sends both 0 and "0" depending on the mood it's in
    code: serde_json::Value,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    #[serde(default)]
    token: String,
}

impl TokenEnvelope {
    fn is_success(&self) -> bool {
        match &self.code {
            serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
            serde_json::Value::String(s) => s == "0",
            _ => false,
        }
    }

    fn into_token(self) -> Result<String, AuthError> {
        if !self.is_success() {
            return Err(AuthError::Rejected {
                code: self.code.to_string(),
                message: self.message,
            });
        }

        match self.data {
            Some(data) if !data.token.is_empty() => Ok(data.token),
            _ => Err(AuthError::Rejected {
                code: self.code.to_string(),
                message: "response carried no token".to_string(),
            }),
        }
    }
}

/// `GET {upstream}/v1/auth/video/token?id=0` against the platform api
pub struct UpstreamTokenIssuer {
    http: reqwest::Client,
    upstream_api: String,
    signer: Arc<Signer>,
}

impl UpstreamTokenIssuer {
    pub fn new(
        upstream_api: &str,
        signer: Arc<Signer>,
        base_headers: HeaderMap,
        timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .default_headers(base_headers)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                error!("failed to build token client, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            http,
            upstream_api: upstream_api.trim_end_matches('/').to_string(),
            signer,
        }
    }
}

#[async_trait]
impl TokenIssuerTrait for UpstreamTokenIssuer {
    async fn issue_video_token(&self, login_token: &str) -> Result<String, AuthError> {
        let url = format!("{}/v1/auth/video/token?id=0", self.upstream_api);

        // the web client signs this call with the literal "undefined" instead of a timestamp
        let response = self
            .http
            .get(&url)
            .header("Xdomain-Client", "web_user")
            .header("Xclient-Version", "v1")
            .header(
                "Xclient-Signature",
                self.signer.digest_for(TOKEN_TIMESTAMP_PLACEHOLDER),
            )
            .header("Xclient-Timestamp", Signer::now().to_string())
            .header(AUTHORIZATION, format!("Bearer {}", login_token))
            .send()
            .await
            .map_err(AuthError::Transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(AuthError::Transport)?;

        let envelope: TokenEnvelope = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(AuthError::Status(status)),
            Err(e) => return Err(AuthError::Parse(e)),
        };

        envelope.into_token()
    }
}

#[derive(Debug, Clone)]
struct TokenCacheEntry {
    video_token: String,
    fetched_at: Instant,
}

/// login credential -> most recent video token
///
/// the lock is never held across the issuer call, two concurrent misses for the same credential
/// both go upstream and the later insert wins
pub struct TokenCache {
    issuer: DynTokenIssuer,
    entries: RwLock<HashMap<String, TokenCacheEntry>>,
    ttl: Duration,
}

impl TokenCache {
    pub fn new(issuer: DynTokenIssuer) -> Self {
        Self::with_ttl(issuer, TOKEN_TTL)
    }

    pub fn with_ttl(issuer: DynTokenIssuer, ttl: Duration) -> Self {
        Self {
            issuer,
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn cached(&self, login_token: &str) -> Option<String> {
        let entries = self.entries.read();
        entries
            .get(login_token)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.video_token.clone())
    }
}

#[async_trait]
impl TokenServiceTrait for TokenCache {
    async fn get_token(&self, login_token: &str) -> Result<String, AuthError> {
        if let Some(token) = self.cached(login_token) {
            debug!("video token cache hit");
            return Ok(token);
        }

        let video_token = self.issuer.issue_video_token(login_token).await.map_err(|e| {
            error!("failed to get video token: {}", e);
            e
        })?;

        self.entries.write().insert(
            login_token.to_string(),
            TokenCacheEntry {
                video_token: video_token.clone(),
                fetched_at: Instant::now(),
            },
        );

        info!("issued fresh video token");
        Ok(video_token)
    }

    fn invalidate(&self, login_token: &str) {
        if self.entries.write().remove(login_token).is_some() {
            debug!("invalidated cached video token");
        }
    }
}
