use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Typed evaluation failures (`no_resume`, `evaluation_error`) are NOT errors:
/// they are recorded as `EvaluationRecord::Failure` data on the candidate-round
/// and never pass through this type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Persist failed: {0}")]
    Persist(String),

    #[error("Round activation failed: {0}")]
    Activation(String),

    #[error("Evaluation service error: {0}")]
    Evaluation(String),

    /// Operation raced a round-template switch and was discarded.
    /// Never surfaced to the user as a failure.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Fetch(msg) => {
                tracing::error!("Fetch error: {msg}");
                (StatusCode::BAD_GATEWAY, "FETCH_ERROR", msg.clone())
            }
            AppError::Persist(msg) => {
                tracing::error!("Persist error: {msg}");
                (StatusCode::BAD_GATEWAY, "PERSIST_ERROR", msg.clone())
            }
            AppError::Activation(msg) => {
                tracing::error!("Activation error: {msg}");
                (StatusCode::BAD_GATEWAY, "ACTIVATION_ERROR", msg.clone())
            }
            AppError::Evaluation(msg) => {
                tracing::error!("Evaluation service error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "EVALUATION_ERROR",
                    "The evaluation service could not be reached".to_string(),
                )
            }
            AppError::Cancelled => {
                // Cancelled loads produce no visible error at all.
                return StatusCode::NO_CONTENT.into_response();
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
