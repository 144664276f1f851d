use axum::{Json, Router, http::StatusCode, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::server::{get_app_version, get_uptime_seconds};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
}

pub struct HealthController;

impl HealthController {
    pub fn app() -> Router {
        Router::new().route("/health", get(Self::health_endpoint))
    }

    /// nothing to check upstream, if we can answer we're up
    async fn health_endpoint() -> (StatusCode, Json<HealthResponse>) {
        let response = HealthResponse {
            status: "ok",
            timestamp: Utc::now(),
            uptime_seconds: get_uptime_seconds(),
            version: get_app_version().to_string(),
        };

        (StatusCode::OK, Json(response))
    }
}
