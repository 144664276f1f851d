use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::debug;

pub type AppResult<T> = Result<T, Error>;

/// errors that end up as an http response, everything below gets mapped into one of these at the
/// controller boundary
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("internal server error")]
    InternalServerError,

    #[error("{0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::InternalServerError | Self::InternalServerErrorWithContext(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        debug!("responding with {}: {}", status, self);
        (status, self.to_string()).into_response()
    }
}

/// loading the mapping table, fatal at startup and only reported on reload
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("failed to read mappings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse mappings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// video token issuance, never retried inside the token cache
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("token endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("failed to parse token response: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("token endpoint rejected credential (code {code}): {message}")]
    Rejected { code: String, message: String },
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("upstream returned status {0}")]
    UpstreamStatus(reqwest::StatusCode),

    #[error("token refresh failed: {0}")]
    Auth(#[from] AuthError),

    #[error("failed to read upstream body: {0}")]
    Body(#[source] reqwest::Error),
}
