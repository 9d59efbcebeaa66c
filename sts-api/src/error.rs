//! HTTP error type
//!
//! Every handler error is rendered as
//! `{"error": {"code": "...", "message": "..."}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{PrioritizationError, ScrapeError};
use crate::store::StoreError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown or expired task (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Validation failure (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Valid request the task cannot satisfy (422)
    #[error("Unprocessable: {0}")]
    UnprocessableEntity(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),

    #[error("Common error: {0}")]
    Common(#[from] sts_common::Error),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ApiError::NotFound(format!("Task {} not found or expired", id)),
            StoreError::Terminal(..) | StoreError::InvalidUpdate(_) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PrioritizationError> for ApiError {
    fn from(e: PrioritizationError) -> Self {
        match e {
            PrioritizationError::TaskNotFound(id) => {
                ApiError::NotFound(format!("Task {} not found or expired", id))
            }
            PrioritizationError::TaskNotCompleted(..) | PrioritizationError::InvalidRequest(_) => {
                ApiError::BadRequest(e.to_string())
            }
            PrioritizationError::InsufficientData(_) => ApiError::UnprocessableEntity(e.to_string()),
            PrioritizationError::Store(inner) => inner.into(),
        }
    }
}

impl From<ScrapeError> for ApiError {
    fn from(e: ScrapeError) -> Self {
        match e {
            ScrapeError::Store(inner) => inner.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_DATA",
                msg,
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, message = %message, "Request failed");
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

#[cfg(test)]
mod tests {
    use super::*;
    use sts_common::events::TaskStatus;

    #[test]
    fn test_store_not_found_maps_to_404() {
        let err: ApiError = StoreError::NotFound("abc".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_prioritization_mapping() {
        let cases = [
            (PrioritizationError::TaskNotFound("x".to_string()), StatusCode::NOT_FOUND),
            (
                PrioritizationError::TaskNotCompleted("x".to_string(), TaskStatus::Running),
                StatusCode::BAD_REQUEST,
            ),
            (
                PrioritizationError::InsufficientData("x".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (err, status) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.into_response().status(), status);
        }
    }
}
