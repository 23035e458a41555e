//! Route definitions for progress streams.

use axum::routing::get;
use axum::Router;

use crate::handlers::streams;
use crate::state::AppState;

/// Routes mounted at `/streams`.
///
/// ```text
/// GET    /{job_class}?job_id=   -> stream_progress (SSE)
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{job_class}", get(streams::stream_progress))
}
