//! Handlers for the `/jobs` resource.
//!
//! Jobs are submitted here and then observed either by polling
//! [`get_job`] or by opening a progress stream (see
//! [`crate::handlers::streams`]).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use gridlab_core::types::{JobClass, JobId, JobStatus};
use gridlab_supervisor::JobFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub job_class: JobClass,
    pub scenario_key: String,
    /// Analysis configuration handed to the worker verbatim.
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    /// `false` when the job had already finished.
    pub acknowledged: bool,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    pub job_class: Option<JobClass>,
    pub status: Option<JobStatus>,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Start a worker for `(job_class, scenario_key)`. Returns 201 with the new
/// job id, or 409 if a job for the same scenario is still running.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    let config = match input.config {
        Value::Null => Value::Object(Default::default()),
        config @ Value::Object(_) => config,
        _ => {
            return Err(AppError::BadRequest(
                "config must be a JSON object".to_string(),
            ))
        }
    };

    let job_id = state
        .supervisor
        .submit(input.job_class, &input.scenario_key, &config)
        .await?;

    tracing::info!(
        job_id = %job_id,
        job_class = %input.job_class,
        scenario_key = %input.scenario_key,
        "Job submitted",
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: SubmitJobResponse { job_id },
        }),
    ))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// List known jobs, newest first. Supports optional `job_class` and
/// `status` query parameters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.supervisor.list(&JobFilter {
        job_class: params.job_class,
        status: params.status,
    });
    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.supervisor.status(&job_id)?;
    Ok(Json(DataResponse { data: snapshot }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Request cancellation. Idempotent; cancelling a finished job is a no-op
/// reported as `acknowledged: false`.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let acknowledged = state.supervisor.cancel(&job_id)?;
    Ok(Json(DataResponse {
        data: CancelJobResponse { acknowledged },
    }))
}
