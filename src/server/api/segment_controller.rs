use axum::{Extension, Router, extract::Query, http::Uri, response::Response, routing::get};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::server::{
    error::{AppResult, Error},
    services::{AppServices, NetworkClass, segment_services::SegmentRequest},
    utils::url_utils::{decode_path_segment, host_of, resolve_segment_url},
};

#[derive(Deserialize)]
struct SegmentQuery {
    base: Option<String>,
    token: Option<String>,
}

pub struct SegmentController;

impl SegmentController {
    pub fn app() -> Router {
        Router::new()
            .route("/external/ts/{*name}", get(Self::segment))
            .route("/intranet/ts/{*name}", get(Self::segment))
    }

    async fn segment(
        Extension(services): Extension<AppServices>,
        Query(params): Query<SegmentQuery>,
        uri: Uri,
    ) -> AppResult<Response> {
        let class = NetworkClass::from_path(uri.path());

        // decoded by hand off the raw path so a bad escape is our 400 and not a router rejection
        let raw_name = uri
            .path()
            .strip_prefix(class.segment_prefix())
            .unwrap_or_default();

        let Some(name) = decode_path_segment(raw_name) else {
            error!("Invalid TS filename {}", raw_name);
            return Err(Error::BadRequest("Invalid TS filename".to_string()));
        };

        let (Some(base), Some(login_token)) = (
            params.base.filter(|b| !b.is_empty()),
            params.token.filter(|t| !t.is_empty()),
        ) else {
            return Err(Error::BadRequest(
                "Missing required parameters: base and token".to_string(),
            ));
        };

        // an absolute name ignores base entirely, so check where the request will really go
        let host = host_of(&resolve_segment_url(&base, &name)).unwrap_or_default();
        if !services.config.is_allowed_video_host(&host) {
            warn!("rejecting segment for disallowed host '{}'", host);
            return Err(Error::BadRequest(format!(
                "Invalid video URL: host '{}' is not allowed",
                host
            )));
        }

        debug!("segment request ({:?}): {}", class, name);

        services
            .segments
            .relay_segment(SegmentRequest {
                name,
                base,
                login_token,
                class,
            })
            .await
    }
}
