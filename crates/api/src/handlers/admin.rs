//! Administrative handlers: cache maintenance and stream diagnostics.

use std::path::PathBuf;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    /// Every cached artifact at or beneath this path is dropped.
    pub path_prefix: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub removed: usize,
}

/// GET /api/v1/admin/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.cache.stats(),
    }))
}

/// POST /api/v1/admin/cache/invalidate
pub async fn invalidate_cache(
    State(state): State<AppState>,
    Json(input): Json<InvalidateRequest>,
) -> AppResult<impl IntoResponse> {
    if input.path_prefix.as_os_str().is_empty() {
        return Err(AppError::BadRequest(
            "path_prefix must not be empty".to_string(),
        ));
    }

    let removed = state.cache.invalidate(&input.path_prefix).await?;
    Ok(Json(DataResponse {
        data: InvalidateResponse { removed },
    }))
}

/// GET /api/v1/admin/streams/stats
///
/// Open subscriptions and published event counts per job class.
pub async fn stream_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.bus.stats(),
    }))
}
