pub mod admin;
pub mod artifacts;
pub mod health;
pub mod jobs;
pub mod streams;

use std::time::Duration;

use axum::http::StatusCode;
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                                 list, submit
/// /jobs/{id}                            get
/// /jobs/{id}/cancel                     cancel (POST)
///
/// /artifacts/load                       load cached artifact (POST)
///
/// /admin/cache/stats                    cache statistics
/// /admin/cache/invalidate               invalidate by path prefix (POST)
/// /admin/streams/stats                  per-class stream statistics
///
/// /streams/{job_class}                  progress stream (SSE, no timeout)
/// ```
///
/// `request_timeout` applies to every route except the streams, which stay
/// open until their job finishes.
pub fn api_routes(request_timeout: Duration) -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/artifacts", artifacts::router())
        .nest("/admin", admin::router())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .nest("/streams", streams::router())
}
