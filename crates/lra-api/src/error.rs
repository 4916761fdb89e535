//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps coordinator errors from `lra-core` to HTTP status codes and returns
//! JSON error bodies with an error code and message. Internal error details
//! are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lra_core::LraError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "GONE").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Unknown LRA (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The LRA has finished or is finishing and cannot accept the request (410).
    #[error("gone: {0}")]
    Gone(String),

    /// The LRA deadline has passed (412).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Malformed id, descriptor, time limit or status filter (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict with current LRA state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Gone(_) => (StatusCode::GONE, "GONE"),
            Self::PreconditionFailed(_) => (StatusCode::PRECONDITION_FAILED, "PRECONDITION_FAILED"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LraError> for AppError {
    fn from(err: LraError) -> Self {
        match err {
            LraError::NotFound(_) => Self::NotFound(err.to_string()),
            LraError::Gone { .. } => Self::Gone(err.to_string()),
            LraError::PreconditionFailed(_) => Self::PreconditionFailed(err.to_string()),
            LraError::Validation(_) => Self::BadRequest(err.to_string()),
            LraError::InvalidTransition { .. } => Self::Conflict(err.to_string()),
            LraError::Persistence(_) | LraError::Io(_) | LraError::Json(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<lra_core::ValidationError> for AppError {
    fn from(err: lra_core::ValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lra_core::{LraId, ValidationError};

    #[test]
    fn lra_errors_map_to_protocol_codes() {
        let id = LraId::new();
        let cases = [
            (LraError::NotFound(id), StatusCode::NOT_FOUND),
            (
                LraError::Gone {
                    id,
                    reason: "LRA is Closed".into(),
                },
                StatusCode::GONE,
            ),
            (LraError::PreconditionFailed(id), StatusCode::PRECONDITION_FAILED),
            (
                LraError::Validation(ValidationError::InvalidDescriptor("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                LraError::Persistence("disk full".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let (status, _) = AppError::from(err).status_and_code();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn error_body_serializes() {
        let body = ErrorBody {
            error: ErrorDetail {
                code: "GONE".to_string(),
                message: "LRA is Closed".to_string(),
            },
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("GONE"));
        assert!(json.contains("LRA is Closed"));
    }

    // ── into_response tests ──────────────────────────────────────

    use http_body_util::BodyExt;

    async fn response_parts(err: AppError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn into_response_gone() {
        let (status, body) = response_parts(AppError::Gone("LRA is Cancelled".into())).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body.error.code, "GONE");
        assert!(body.error.message.contains("Cancelled"));
    }

    #[tokio::test]
    async fn into_response_hides_internal_details() {
        let (status, body) =
            response_parts(AppError::Internal("snapshot write failed".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.error.message.contains("snapshot"));
    }
}
