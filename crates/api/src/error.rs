//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use lookbook_clients::JobError;
use lookbook_core::error::CoreError;
use lookbook_gallery::GalleryError;
use lookbook_pipeline::PipelineError;

/// Everything a handler can fail with. Domain errors carry their own
/// messages; the `IntoResponse` impl decides status codes and hides
/// internal detail.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Gallery(#[from] GalleryError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

fn core_error_response(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Guard(msg) => (StatusCode::CONFLICT, "STAGE_GUARD", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "internal core error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

fn pipeline_error_response(err: &PipelineError) -> (StatusCode, &'static str, String) {
    match err {
        PipelineError::Core(inner) => core_error_response(inner),
        PipelineError::RunNotFound(id) => (
            StatusCode::NOT_FOUND,
            "RUN_NOT_FOUND",
            format!("Run {id} not found"),
        ),
        PipelineError::Busy => (
            StatusCode::CONFLICT,
            "RUN_BUSY",
            "A batch is already in flight for this run".to_string(),
        ),
        PipelineError::WrongStage(msg) => (StatusCode::CONFLICT, "WRONG_STAGE", msg.clone()),
        PipelineError::BatchFailed(msg) => {
            (StatusCode::BAD_GATEWAY, "BATCH_FAILED", msg.clone())
        }
        PipelineError::Job(JobError::Timeout { job_id }) => (
            StatusCode::GATEWAY_TIMEOUT,
            "UPSTREAM_TIMEOUT",
            format!("Upstream job {job_id} timed out"),
        ),
        PipelineError::Job(inner) => (
            StatusCode::BAD_GATEWAY,
            "UPSTREAM_ERROR",
            inner.to_string(),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(err) => core_error_response(err),
            AppError::Pipeline(err) => pipeline_error_response(err),
            AppError::Gallery(err) => {
                tracing::error!(error = %err, "gallery store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "GALLERY_ERROR",
                    "Failed to access the gallery store".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Status mapping --

    #[test]
    fn validation_maps_to_bad_request() {
        let (status, code, _) =
            core_error_response(&CoreError::Validation("missing garment".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "VALIDATION_ERROR");
    }

    #[test]
    fn guard_maps_to_conflict() {
        let (status, _, _) = core_error_response(&CoreError::Guard("not ready".into()));
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn missing_run_maps_to_not_found() {
        let (status, code, _) =
            pipeline_error_response(&PipelineError::RunNotFound(uuid::Uuid::new_v4()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, "RUN_NOT_FOUND");
    }

    #[test]
    fn upstream_timeout_maps_to_gateway_timeout() {
        let err = PipelineError::Job(JobError::Timeout {
            job_id: "abc".into(),
        });
        let (status, code, message) = pipeline_error_response(&err);
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(code, "UPSTREAM_TIMEOUT");
        assert!(message.contains("abc"));
    }

    #[test]
    fn batch_failure_maps_to_bad_gateway() {
        let (status, _, _) =
            pipeline_error_response(&PipelineError::BatchFailed("all keys failed".into()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn internal_messages_are_sanitized() {
        let (_, _, message) = core_error_response(&CoreError::Internal("db password leak".into()));
        assert!(!message.contains("leak"));
    }
}
