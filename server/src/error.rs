use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use better_images::JobError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`JobError`] for domain errors and adds transport-specific variants.
/// Implements [`IntoResponse`] to produce `{error, code}` JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Job(#[from] JobError),

    /// Malformed or rejected JSON body.
    #[error(transparent)]
    Json(#[from] JsonRejection),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Job(job) => match job {
                JobError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                JobError::NotFound { .. } => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", job.to_string())
                }
                JobError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                JobError::Provider(_) | JobError::Storage(_) | JobError::Worker(_) => {
                    tracing::error!(error = %job, "Job operation failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::Json(rejection) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                rejection.body_text(),
            ),
            AppError::Multipart(err) => (err.status(), "BAD_REQUEST", err.body_text()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
