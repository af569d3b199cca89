//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keybind_license::LicenseError;
use serde::Serialize;
use thiserror::Error;

/// Errors a handler can end in. Each maps to one status code and a
/// `{"status":"error","error":...}` body.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient backend failure. Details are logged, never returned.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    error: String,
}

impl From<LicenseError> for ApiError {
    fn from(e: LicenseError) -> Self {
        match e {
            LicenseError::Storage(e) => Self::Unavailable(e.to_string()),
            LicenseError::Malformed(msg) => Self::BadRequest(msg),
            LicenseError::UnknownLicenseType(t) => {
                Self::BadRequest(format!("unknown license type: {t}"))
            }
            LicenseError::AlreadyExists(key) => Self::Conflict(format!("key already exists: {key}")),
            LicenseError::NotFound(key) => Self::NotFound(format!("no such key: {key}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Unavailable(detail) => {
                tracing::error!("storage unavailable: {detail}");
                (StatusCode::SERVICE_UNAVAILABLE, "server error".to_string())
            }
        };

        let body = ErrorBody {
            status: "error",
            error,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
