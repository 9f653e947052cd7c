use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Name of the configured image backend.
    pub backend: String,
    /// Tasks currently held by the progress tracker.
    pub tracked_tasks: usize,
    pub gallery_items: usize,
}

/// Service description served at `/`.
#[derive(Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: &'static [&'static str],
}

const ENDPOINTS: &[&str] = &[
    "GET /health",
    "POST /v1/image/generations",
    "GET /v1/progress/{task_id}",
    "GET /v1/progress/{task_id}/events",
    "POST /v1/batch",
    "GET /v1/batch/{batch_id}",
    "GET /v1/gallery",
    "POST /v1/gallery",
    "GET /v1/gallery/{id}",
    "DELETE /v1/gallery/{id}",
];

/// GET /health -- returns service status and store sizes.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.orchestrator.backend_name().to_string(),
        tracked_tasks: state.orchestrator.tracker().len(),
        gallery_items: state.gallery.len(),
    })
}

/// GET / -- service name and endpoint list.
async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        endpoints: ENDPOINTS,
    })
}

/// Mount health and info routes (root level, NOT under `/v1`).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
}
