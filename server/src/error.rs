use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use wds_signups::{ErrorClass, SignupError};

/// Errors returned from HTTP handlers; rendered as `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("No admin key configured")]
    NoAdminKey,

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error(transparent)]
    Signup(#[from] SignupError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson | ApiError::UnknownFormat(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NoAdminKey => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Signup(err) => match err.class() {
                ErrorClass::Invalid => StatusCode::BAD_REQUEST,
                ErrorClass::Upstream => StatusCode::BAD_GATEWAY,
                ErrorClass::Misconfigured | ErrorClass::Internal => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
