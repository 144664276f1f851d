use std::sync::Arc;

use tracing::info;

use crate::{
    config::AppConfig,
    server::{
        services::{
            intranet_services::SharedIntranetMapper,
            proxy_client_services::ProxyClient,
            segment_services::SegmentService,
            stream_services::StreamService,
            token_services::{DynTokenIssuer, TokenCache, UpstreamTokenIssuer},
        },
        utils::signature_utils::Signer,
    },
};

use super::{
    proxy_client_services::SharedProxyClient, segment_services::DynSegmentService,
    stream_services::DynStreamService, token_services::DynTokenService,
};

/// everything the controllers need, cloned into every request through an Extension
#[derive(Clone)]
pub struct AppServices {
    pub signer: Arc<Signer>,
    pub mapper: SharedIntranetMapper,
    pub tokens: DynTokenService,
    pub proxy: SharedProxyClient,
    pub streams: DynStreamService,
    pub segments: DynSegmentService,
    pub config: Arc<AppConfig>,
}

impl AppServices {
    pub fn new(config: Arc<AppConfig>, mapper: SharedIntranetMapper) -> Self {
        let signer = Arc::new(Signer::new(config.magic_key.clone()));

        let issuer = Arc::new(UpstreamTokenIssuer::new(
            &config.upstream_api,
            signer.clone(),
            config.upstream_headers(),
            config.token_timeout,
        )) as DynTokenIssuer;

        Self::with_issuer(config, mapper, issuer)
    }

    /// same wiring with a different token issuer, tests swap in a mock here
    pub fn with_issuer(
        config: Arc<AppConfig>,
        mapper: SharedIntranetMapper,
        issuer: DynTokenIssuer,
    ) -> Self {
        info!("starting proxy services...");

        let signer = Arc::new(Signer::new(config.magic_key.clone()));
        let tokens = Arc::new(TokenCache::new(issuer)) as DynTokenService;
        let proxy = Arc::new(ProxyClient::new(&config, mapper.clone()));

        info!("token cache and proxy client ok, starting orchestrators...");

        let streams = Arc::new(StreamService::new(
            signer.clone(),
            tokens.clone(),
            proxy.clone(),
        )) as DynStreamService;

        let segments = Arc::new(SegmentService::new(
            signer.clone(),
            tokens.clone(),
            proxy.clone(),
        )) as DynSegmentService;

        Self {
            signer,
            mapper,
            tokens,
            proxy,
            streams,
            segments,
            config,
        }
    }
}
