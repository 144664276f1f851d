use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use tracing::{debug, error};

use crate::server::{
    error::{AppResult, Error},
    services::{
        proxy_client_services::{NetworkClass, SharedProxyClient},
        retry_context::TokenRefreshContext,
        token_services::DynTokenService,
    },
    utils::{signature_utils::Signer, url_utils::resolve_segment_url},
};

pub type DynSegmentService = Arc<dyn SegmentServiceTrait + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SegmentRequest {
    /// decoded segment reference exactly as it appeared in the manifest
    pub name: String,
    /// the manifest's original url, relative references resolve against it
    pub base: String,
    pub login_token: String,
    pub class: NetworkClass,
}

#[async_trait]
pub trait SegmentServiceTrait {
    async fn relay_segment(&self, request: SegmentRequest) -> AppResult<Response>;
}

pub struct SegmentService {
    signer: Arc<Signer>,
    tokens: DynTokenService,
    proxy: SharedProxyClient,
}

impl SegmentService {
    pub fn new(signer: Arc<Signer>, tokens: DynTokenService, proxy: SharedProxyClient) -> Self {
        Self {
            signer,
            tokens,
            proxy,
        }
    }
}

#[async_trait]
impl SegmentServiceTrait for SegmentService {
    async fn relay_segment(&self, request: SegmentRequest) -> AppResult<Response> {
        let segment_url = resolve_segment_url(&request.base, &request.name);
        debug!("relaying segment {}", segment_url);

        let mut context = TokenRefreshContext::start(
            self.signer.clone(),
            self.tokens.clone(),
            segment_url.clone(),
            request.login_token,
        )
        .await
        .map_err(|e| {
            error!("Failed to get video token: {}", e);
            Error::InternalServerErrorWithContext("Failed to get video token".to_string())
        })?;

        // nothing has gone to the player until this returns, after that the body is live
        self.proxy
            .relay_with_retry(request.class, &mut context)
            .await
            .map_err(|e| {
                error!("Failed to proxy TS {}: {}", segment_url, e);
                Error::BadGateway("Failed to proxy TS".to_string())
            })
    }
}
