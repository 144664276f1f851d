pub mod api;
pub mod error;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use anyhow::Context;
use axum::{
    Extension, Router,
    extract::Request,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    config::AppConfig,
    server::{
        api::{
            config_controller::ConfigController, health_controller::HealthController,
            segment_controller::SegmentController, stream_controller::StreamController,
        },
        services::{AppServices, SharedIntranetMapper},
    },
};

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

pub fn get_uptime_seconds() -> u64 {
    STARTED_AT.get_or_init(Instant::now).elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct ApplicationServer;

impl ApplicationServer {
    pub fn router(services: AppServices) -> Router {
        STARTED_AT.get_or_init(Instant::now);

        Router::new()
            .merge(HealthController::app())
            .merge(StreamController::app())
            .merge(SegmentController::app())
            .nest("/api/v1/config", ConfigController::app())
            .layer(Extension(services))
            .layer(middleware::from_fn(cors))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(config: Arc<AppConfig>, mapper: SharedIntranetMapper) -> anyhow::Result<()> {
        let services = AppServices::new(config.clone(), mapper.clone());

        Self::reload_on_hangup(mapper);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!("listening on {}", addr);

        axum::serve(listener, Self::router(services))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server exited with an error")?;

        info!("server shut down");
        Ok(())
    }

    /// SIGHUP does the same thing as POST /api/v1/config/reload
    #[cfg(unix)]
    fn reload_on_hangup(mapper: SharedIntranetMapper) {
        use tokio::signal::unix::{SignalKind, signal};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                error!("failed to listen for SIGHUP, reload only via api: {}", e);
                return;
            }
        };

        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                info!("received SIGHUP, reloading mappings...");
                match mapper.reload() {
                    Ok(count) => info!("mappings reloaded ({} rules)", count),
                    Err(e) => error!("failed to reload mappings: {}", e),
                }
            }
        });
    }

    #[cfg(not(unix))]
    fn reload_on_hangup(_mapper: SharedIntranetMapper) {}
}

/// permissive cors on everything, OPTIONS never reaches the router
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );

    response
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
