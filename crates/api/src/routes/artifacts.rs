use axum::routing::post;
use axum::Router;

use crate::handlers::artifacts;
use crate::state::AppState;

/// Routes mounted at `/artifacts`.
///
/// ```text
/// POST   /load            -> load_artifact
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/load", post(artifacts::load_artifact))
}
