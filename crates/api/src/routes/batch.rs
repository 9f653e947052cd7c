//! Route definitions for the `/batch` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::batch;
use crate::state::AppState;

/// Routes mounted at `/batch`.
///
/// ```text
/// POST   /                -> submit_batch
/// GET    /{batch_id}      -> get_batch
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(batch::submit_batch))
        .route("/{batch_id}", get(batch::get_batch))
}
