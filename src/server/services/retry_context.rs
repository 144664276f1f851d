use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::server::{
    error::AuthError,
    services::{proxy_client_services::RetryHooks, token_services::DynTokenService},
    utils::signature_utils::Signer,
};

/// what a manifest or segment fetch carries between attempts: the target, who is asking, and the
/// video token currently in use
///
/// a retry swaps `video_token` for a freshly issued one and the next `build_url` signs with it
pub struct TokenRefreshContext {
    signer: Arc<Signer>,
    tokens: DynTokenService,
    target_url: String,
    login_token: String,
    video_token: String,
}

impl TokenRefreshContext {
    /// grabs the initial video token, failing here means nothing was sent upstream yet
    pub async fn start(
        signer: Arc<Signer>,
        tokens: DynTokenService,
        target_url: String,
        login_token: String,
    ) -> Result<Self, AuthError> {
        let video_token = tokens.get_token(&login_token).await?;

        Ok(Self {
            signer,
            tokens,
            target_url,
            login_token,
            video_token,
        })
    }
}

#[async_trait]
impl RetryHooks for TokenRefreshContext {
    fn build_url(&self) -> String {
        let obfuscated = self.signer.obfuscate(&self.target_url);
        self.signer.sign(&obfuscated, &self.video_token)
    }

    async fn on_retry(&mut self, attempt: u32) -> Result<(), AuthError> {
        info!("retry {} for {}, refreshing video token", attempt + 1, self.target_url);

        self.tokens.invalidate(&self.login_token);
        self.video_token = self.tokens.get_token(&self.login_token).await?;
        Ok(())
    }
}
