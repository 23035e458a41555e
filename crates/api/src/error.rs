use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gridlab_cache::CacheError;
use gridlab_core::error::CoreError;
use gridlab_supervisor::SupervisorError;
use serde_json::json;

/// Error returned by every handler.
///
/// Rendered as `{ "error": <message>, "code": <CODE> }`. Messages of
/// server-side failures are replaced by a generic text and logged instead.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `gridlab_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A job submission or lookup error.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// A result cache error.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Request shape the domain crates never see (e.g. a non-object `config`).
    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type AppResult<T> = Result<T, AppError>;

type ErrorParts = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Supervisor(err) => classify_supervisor_error(err),
            AppError::Cache(err) => classify_cache_error(err),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> ErrorParts {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> ErrorParts {
    match err {
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
    }
}

/// Spawn-time failures are reported without their OS details.
fn classify_supervisor_error(err: &SupervisorError) -> ErrorParts {
    match err {
        SupervisorError::Core(core) => classify_core_error(core),
        SupervisorError::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT", err.to_string()),
        SupervisorError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        SupervisorError::NoWorker(_) | SupervisorError::ShuttingDown => (
            StatusCode::SERVICE_UNAVAILABLE,
            "UNAVAILABLE",
            err.to_string(),
        ),
        SupervisorError::SpawnFailure { .. } => {
            tracing::error!(error = %err, "Worker spawn failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SPAWN_FAILURE",
                "Failed to start the job worker".to_string(),
            )
        }
        SupervisorError::InputArtifact { .. } => {
            tracing::error!(error = %err, "Job input write failed");
            internal()
        }
    }
}

fn classify_cache_error(err: &CacheError) -> ErrorParts {
    match err {
        CacheError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        CacheError::Parse { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "PARSE_ERROR",
            err.to_string(),
        ),
        CacheError::Io { .. } | CacheError::Codec(_) | CacheError::Task(_) => {
            tracing::error!(error = %err, "Cache error");
            internal()
        }
    }
}
