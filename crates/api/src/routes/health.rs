use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Liveness plus the two numbers operators look at first.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Jobs whose worker is still running.
    pub running_jobs: usize,
    /// Open progress stream subscriptions across all classes.
    pub stream_subscribers: usize,
}

/// GET /health -- returns service status and live job counts.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        running_jobs: state.supervisor.running_count(),
        stream_subscribers: state.bus.subscriber_count(),
    })
}

/// `/health`, mounted at the root next to `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
