pub mod batch;
pub mod gallery;
pub mod generation;
pub mod health;
pub mod progress;

use axum::Router;

use crate::state::AppState;

/// Build the `/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /image/generations                  submit generation / edit (POST)
///
/// /progress/{task_id}                 task snapshot (GET)
/// /progress/{task_id}/events          task snapshots as SSE (GET)
///
/// /batch                              submit batch (POST)
/// /batch/{batch_id}                   batch snapshot (GET)
///
/// /gallery                            list, add
/// /gallery/{id}                       get, delete
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/image", generation::router())
        .nest("/progress", progress::router())
        .nest("/batch", batch::router())
        .nest("/gallery", gallery::router())
}
