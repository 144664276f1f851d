use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::info;

use video_proxy::{
    AppConfig, ApplicationServer, Logger,
    mapping::FileMappingSource,
    server::services::IntranetMapper,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards are kept alive to flush logs and keep the sentry connection
    let _guards = Logger::init(config.cargo_env, &config.log_level, config.sentry_dsn.clone());

    info!("logger and env prepped...");
    info!("upstream api: {}", config.upstream_api);
    info!("mappings file: {}", config.mappings_file);

    // the only startup failure we don't try to recover from
    let mapper = IntranetMapper::load(Arc::new(FileMappingSource::new(&config.mappings_file)))
        .context("failed to load intranet mappings")?;

    info!("mappings ok, starting proxy server on port {}...", config.port);

    ApplicationServer::serve(config, Arc::new(mapper))
        .await
        .context("proxy server failed")?;

    Ok(())
}
