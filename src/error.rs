use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing initData")]
    MissingInput,

    #[error("Missing signature")]
    MissingSignature,

    #[error("Invalid initData signature")]
    InvalidSignature,

    #[error("No user data")]
    MissingUserData,

    #[error("Malformed user data: {0}")]
    MalformedUserData(serde_json::Error),

    #[error("Failed to create session: {0}")]
    SessionCreationFailed(String),

    #[error("Identity provider timed out")]
    UpstreamTimeout,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self {
            Error::MissingInput => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::MissingSignature => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::MissingUserData => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::MalformedUserData(_) => {
                (StatusCode::BAD_REQUEST, "Malformed user data".to_string())
            }
            Error::InvalidSignature => {
                tracing::warn!("rejected initData with mismatched signature");
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Error::SessionCreationFailed(detail) => {
                // Upstream detail stays in the server log.
                tracing::error!(%detail, "identity provider session exchange failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to create session".to_string(),
                )
            }
            Error::UpstreamTimeout => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Reqwest(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("External service error: {}", err),
            ),
            Error::Anyhow(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred".to_string(),
            ),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
