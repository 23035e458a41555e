//! Handlers for cached artifact access.

use std::path::PathBuf;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoadArtifactRequest {
    /// Source file on the server's filesystem.
    pub path: PathBuf,
}

/// POST /api/v1/artifacts/load
///
/// Return the parsed artifact for the current version of `path`, served
/// from cache when possible. 404 if the file does not exist, 422 if it
/// does not parse.
pub async fn load_artifact(
    State(state): State<AppState>,
    Json(input): Json<LoadArtifactRequest>,
) -> AppResult<impl IntoResponse> {
    if input.path.as_os_str().is_empty() {
        return Err(AppError::BadRequest("path must not be empty".to_string()));
    }

    let artifact = state.cache.load(&input.path).await?;
    Ok(Json(DataResponse {
        data: artifact.as_ref(),
    })
    .into_response())
}
