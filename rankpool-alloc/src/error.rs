//! Error types for rankpool-alloc
//!
//! Maps allocation, store and survey failures onto HTTP status codes with
//! a `{"error": {"code", "message"}}` body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rankpool_common::Error;
use serde_json::json;
use thiserror::Error;

use crate::survey::{JudgmentError, SurveyError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. survey already submitted
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rejected ranking or navigation (422)
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// rankpool-common error
    #[error("Common error: {0}")]
    Common(#[from] Error),
}

impl From<JudgmentError> for ApiError {
    fn from(err: JudgmentError) -> Self {
        ApiError::Unprocessable(err.to_string())
    }
}

impl From<SurveyError> for ApiError {
    fn from(err: SurveyError) -> Self {
        match err {
            SurveyError::AlreadySubmitted => ApiError::Conflict(err.to_string()),
            SurveyError::BatchOutOfRange { .. } => ApiError::NotFound(err.to_string()),
            SurveyError::Export(inner) => ApiError::Common(inner),
            other => ApiError::Unprocessable(other.to_string()),
        }
    }
}

fn common_status(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        Error::PoolExhausted { .. } => (StatusCode::SERVICE_UNAVAILABLE, "POOL_EXHAUSTED"),
        Error::Busy { .. } => (StatusCode::SERVICE_UNAVAILABLE, "STORE_BUSY"),
        e if e.is_lock_error() => (StatusCode::SERVICE_UNAVAILABLE, "STORE_BUSY"),
        Error::Catalog(_) | Error::Config(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR")
        }
        Error::Database(_) | Error::TransactionFailed(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
        }
        Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_RANKING", msg)
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            ApiError::Common(ref err) => {
                let (status, code) = common_status(err);
                (status, code, err.to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
