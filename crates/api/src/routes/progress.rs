//! Route definitions for the `/progress` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::progress;
use crate::state::AppState;

/// Routes mounted at `/progress`.
///
/// ```text
/// GET    /{task_id}           -> get_progress
/// GET    /{task_id}/events    -> progress_events (SSE)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{task_id}", get(progress::get_progress))
        .route("/{task_id}/events", get(progress::progress_events))
}
