//! Error types for mixcritic-jobs
//!
//! `JobError` is what the pipeline reports synchronously to callers of
//! enqueue/retry/delete. `ApiError` maps everything to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Synchronous pipeline errors
#[derive(Debug, Error)]
pub enum JobError {
    /// Another job is already queued or running for the same track/project
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The track/job is not in a state that permits the operation
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Common(#[from] mixcritic_common::Error),
}

impl From<sqlx::Error> for JobError {
    fn from(err: sqlx::Error) -> Self {
        JobError::Common(mixcritic_common::Error::Database(err))
    }
}

/// Result type for pipeline operations
pub type JobResult<T> = Result<T, JobError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - a job is already active
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Precondition failed (422) - e.g. review before analysis
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// mixcritic-common error
    #[error("Common error: {0}")]
    Common(mixcritic_common::Error),
}

impl From<mixcritic_common::Error> for ApiError {
    fn from(err: mixcritic_common::Error) -> Self {
        match err {
            mixcritic_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            mixcritic_common::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Common(other),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Conflict(msg) => ApiError::Conflict(msg),
            JobError::Precondition(msg) => ApiError::Precondition(msg),
            JobError::NotFound(msg) => ApiError::NotFound(msg),
            JobError::Common(err) => ApiError::from(err),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Common(mixcritic_common::Error::Database(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Precondition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "PRECONDITION_FAILED",
                msg,
            ),
            ApiError::Common(ref err) => {
                tracing::error!(error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "COMMON_ERROR",
                    err.to_string(),
                )
            }
        };

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
