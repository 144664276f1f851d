use axum::{
    Extension, Router,
    extract::Query,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::server::{
    error::{AppResult, Error},
    services::{AppServices, NetworkClass, stream_services::ManifestRequest},
    utils::url_utils::{host_of, normalize_escaped_slashes, public_origin},
};

#[derive(Deserialize)]
struct StreamQuery {
    url: Option<String>,
    token: Option<String>,
}

pub struct StreamController;

impl StreamController {
    pub fn app() -> Router {
        Router::new()
            .route("/external/stream", get(Self::stream))
            .route("/intranet/stream", get(Self::stream))
    }

    async fn stream(
        Extension(services): Extension<AppServices>,
        Query(params): Query<StreamQuery>,
        headers: HeaderMap,
        uri: Uri,
    ) -> AppResult<Response> {
        let class = NetworkClass::from_path(uri.path());

        let (Some(url), Some(login_token)) = (
            params.url.filter(|u| !u.is_empty()),
            params.token.filter(|t| !t.is_empty()),
        ) else {
            return Err(Error::BadRequest(
                "Missing required parameters: url and token".to_string(),
            ));
        };

        let url = normalize_escaped_slashes(&url);

        let host = host_of(&url).unwrap_or_default();
        if !services.config.is_allowed_video_host(&host) {
            warn!("rejecting manifest for disallowed host '{}'", host);
            return Err(Error::BadRequest(format!(
                "Invalid video URL: host '{}' is not allowed",
                host
            )));
        }

        debug!("manifest request ({:?}): {}", class, url);

        let request = ManifestRequest {
            url,
            login_token,
            class,
            public_origin: public_origin(&headers, &uri, services.config.public_host.as_deref()),
        };

        let manifest = services.streams.fetch_manifest(request).await?;

        Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
            manifest,
        )
            .into_response())
    }
}
