use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::server::{
    error::{AppResult, Error},
    services::{
        proxy_client_services::{NetworkClass, SharedProxyClient},
        retry_context::TokenRefreshContext,
        token_services::DynTokenService,
    },
    utils::{signature_utils::Signer, url_utils::encode_path_segment},
};

pub type DynStreamService = Arc<dyn StreamServiceTrait + Send + Sync>;

/// everything needed to fetch one manifest and point its segments back at us
#[derive(Debug, Clone)]
pub struct ManifestRequest {
    /// original manifest url, already normalised
    pub url: String,
    pub login_token: String,
    pub class: NetworkClass,
    /// scheme://host the player reached us on
    pub public_origin: String,
}

#[async_trait]
pub trait StreamServiceTrait {
    async fn fetch_manifest(&self, request: ManifestRequest) -> AppResult<String>;
}

pub struct StreamService {
    signer: Arc<Signer>,
    tokens: DynTokenService,
    proxy: SharedProxyClient,
}

impl StreamService {
    pub fn new(signer: Arc<Signer>, tokens: DynTokenService, proxy: SharedProxyClient) -> Self {
        Self {
            signer,
            tokens,
            proxy,
        }
    }
}

#[async_trait]
impl StreamServiceTrait for StreamService {
    async fn fetch_manifest(&self, request: ManifestRequest) -> AppResult<String> {
        let mut context = TokenRefreshContext::start(
            self.signer.clone(),
            self.tokens.clone(),
            request.url.clone(),
            request.login_token.clone(),
        )
        .await
        .map_err(|e| {
            error!("Failed to get video token: {}", e);
            Error::InternalServerErrorWithContext("Failed to get video token".to_string())
        })?;

        let body = self
            .proxy
            .fetch_with_retry(request.class, &mut context)
            .await
            .map_err(|e| {
                error!("Failed to fetch M3U8 {}: {}", request.url, e);
                Error::BadGateway("Failed to fetch M3U8".to_string())
            })?;

        let content = String::from_utf8_lossy(&body);
        debug!("fetched M3U8 ({} bytes), rewriting", body.len());

        Ok(rewrite_manifest(
            &content,
            &request.url,
            &request.login_token,
            request.class,
            &request.public_origin,
        ))
    }
}

/// every non-blank, non-comment line becomes a proxy url for that segment, everything else is
/// passed through as-is so tags and ordering survive
pub fn rewrite_manifest(
    content: &str,
    base_url: &str,
    login_token: &str,
    class: NetworkClass,
    public_origin: &str,
) -> String {
    let escaped_base = urlencoding::encode(base_url);
    let escaped_token = urlencoding::encode(login_token);

    content
        .split('\n')
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return line.to_string();
            }

            format!(
                "{}{}{}?base={}&token={}",
                public_origin,
                class.segment_prefix(),
                encode_path_segment(trimmed),
                escaped_base,
                escaped_token
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://cvideo.example.cn/course/1/index.m3u8";

    #[test]
    fn keeps_tags_and_rewrites_segments() {
        let manifest = "#EXTM3U\n#EXTINF:10,\nseg1.ts";
        let out = rewrite_manifest(
            manifest,
            BASE,
            "abc 123",
            NetworkClass::External,
            "http://proxy.local",
        );
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "#EXTINF:10,");
        assert_eq!(
            lines[2],
            "http://proxy.local/external/ts/seg1.ts?base=https%3A%2F%2Fcvideo.example.cn%2Fcourse%2F1%2Findex.m3u8&token=abc%20123"
        );
    }

    #[test]
    fn intranet_segments_use_intranet_prefix() {
        let out = rewrite_manifest(
            "sub/seg 2.ts",
            BASE,
            "tok",
            NetworkClass::Intranet,
            "https://proxy.local",
        );
        assert!(out.starts_with("https://proxy.local/intranet/ts/sub/seg%202.ts?base="));
    }

    #[test]
    fn blank_lines_and_order_survive() {
        let manifest = "#EXTM3U\n\n#EXTINF:4,\na.ts\n#EXTINF:4,\nb.ts\n#EXT-X-ENDLIST\n";
        let out = rewrite_manifest(manifest, BASE, "t", NetworkClass::External, "http://p");
        let lines: Vec<&str> = out.split('\n').collect();

        assert_eq!(lines.len(), 8);
        assert_eq!(lines[1], "");
        assert!(lines[3].contains("/external/ts/a.ts?"));
        assert!(lines[5].contains("/external/ts/b.ts?"));
        assert_eq!(lines[6], "#EXT-X-ENDLIST");
        assert_eq!(lines[7], "");
    }
}
