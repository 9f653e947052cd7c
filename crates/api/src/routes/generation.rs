//! Route definitions for image generation submissions.

use axum::routing::post;
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;

/// Routes mounted at `/image`.
///
/// ```text
/// POST   /generations     -> create_generation
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/generations", post(generation::create_generation))
}
