use axum::{
    Extension, Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::database::mapping::MappingTable;
use crate::server::services::AppServices;

pub struct ConfigController;

impl ConfigController {
    pub fn app() -> Router {
        Router::new()
            .route("/mappings", get(Self::mappings))
            .route("/reload", post(Self::reload))
    }

    async fn mappings(Extension(services): Extension<AppServices>) -> Json<MappingTable> {
        Json(services.mapper.snapshot())
    }

    /// same as sending the process a SIGHUP, a broken file keeps the old table in place
    async fn reload(Extension(services): Extension<AppServices>) -> (StatusCode, Json<Value>) {
        match services.mapper.reload() {
            Ok(count) => {
                info!("mappings reloaded via api ({} rules)", count);
                (StatusCode::OK, Json(json!({ "status": "ok" })))
            }
            Err(e) => {
                error!("Failed to reload mappings: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "status": "error", "error": e.to_string() })),
                )
            }
        }
    }
}
