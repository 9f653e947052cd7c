#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use banana_api::app::build_router;
use banana_api::config::{BackendConfig, EngineConfig, ServerConfig};
use banana_api::state::AppState;
use banana_backend::host::PassthroughHost;
use banana_backend::mock::MockBackend;
use banana_core::backend::ImageBackend;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:10000` as CORS origin, a 5-second backend bound
/// and no task retention.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:10000".to_string()],
        request_timeout_secs: 30,
        log_json: false,
        engine: EngineConfig {
            backend_timeout: Duration::from_secs(5),
            task_retention: None,
            ..EngineConfig::default()
        },
        backend: BackendConfig::default(),
    }
}

/// Build the full application around a zero-latency [`MockBackend`].
pub fn build_test_app() -> (Router, AppState) {
    build_test_app_with(test_config(), Arc::new(MockBackend::new()))
}

/// Build the full application with the given config and backend.
///
/// Goes through the same `build_router` as `main.rs`, so the middleware
/// stack (CORS, request ID, timeout, tracing, panic recovery) is exercised.
pub fn build_test_app_with(
    config: ServerConfig,
    backend: Arc<dyn ImageBackend>,
) -> (Router, AppState) {
    let state = AppState::new(config, backend, Arc::new(PassthroughHost));
    (build_router(state.clone()), state)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, Body::empty(), None).await
}

pub async fn delete(app: Router, uri: &str) -> Response {
    send(app, Method::DELETE, uri, Body::empty(), None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(
        app,
        Method::POST,
        uri,
        Body::from(body.to_string()),
        Some("application/json"),
    )
    .await
}

/// POST a raw body, for malformed-JSON cases.
pub async fn post_raw(app: Router, uri: &str, body: &'static str) -> Response {
    send(app, Method::POST, uri, Body::from(body), Some("application/json")).await
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Body,
    content_type: Option<&str>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Collect a response body as UTF-8 text.
pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ---------------------------------------------------------------------------
// Flow helpers
// ---------------------------------------------------------------------------

/// Submit a generation and return its task id.
pub async fn submit(app: &Router, body: serde_json::Value) -> String {
    let response = post_json(app.clone(), "/v1/image/generations", body).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    json["data"]["task_id"].as_str().unwrap().to_string()
}

/// Poll `/v1/progress/{id}` until the task is terminal and return the
/// final snapshot (the `data` object).
pub async fn wait_for_task(app: &Router, task_id: &str) -> serde_json::Value {
    for _ in 0..500 {
        let response = get(app.clone(), &format!("/v1/progress/{task_id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let task = body_json(response).await["data"].clone();
        if task["stage"] == "complete" || task["stage"] == "failed" {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} did not finish");
}

/// Poll `/v1/batch/{id}` until `all_done` and return the snapshot.
pub async fn wait_for_batch(app: &Router, batch_id: &str) -> serde_json::Value {
    for _ in 0..500 {
        let response = get(app.clone(), &format!("/v1/batch/{batch_id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let batch = body_json(response).await["data"].clone();
        if batch["all_done"] == true {
            return batch;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("batch {batch_id} did not finish");
}
