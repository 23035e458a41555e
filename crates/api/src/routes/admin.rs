//! Route definitions for administrative endpoints.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// ```text
/// GET    /cache/stats         -> cache_stats
/// POST   /cache/invalidate    -> invalidate_cache
/// GET    /streams/stats       -> stream_stats
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cache/stats", get(admin::cache_stats))
        .route("/cache/invalidate", post(admin::invalidate_cache))
        .route("/streams/stats", get(admin::stream_stats))
}
