//! HTTP-level integration tests for the gallery resource.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::Router;
use banana_backend::mock::MockBackend;
use banana_core::task::MAX_PROMPT_LEN;
use common::{body_json, delete, get, post_json};
use serde_json::json;

/// POST an item and return its id.
async fn add(app: &Router, body: serde_json::Value) -> String {
    let response = post_json(app.clone(), "/v1/gallery", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn list(app: &Router, query: &str) -> Vec<serde_json::Value> {
    let response = get(app.clone(), &format!("/v1/gallery{query}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["data"].as_array().unwrap().clone()
}

fn prompts(items: &[serde_json::Value]) -> Vec<&str> {
    items.iter().map(|i| i["prompt"].as_str().unwrap()).collect()
}

// ---------------------------------------------------------------------------
// Test: POST /v1/gallery creates an item
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_item_returns_201() {
    let (app, _) = common::build_test_app();
    let response = post_json(
        app,
        "/v1/gallery",
        json!({
            "prompt": "misty forest",
            "image_url": "https://cdn.example.com/forest.webp",
            "format": "webp"
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert!(json["data"]["id"].is_string());
    assert_eq!(json["data"]["kind"], "create");
    assert_eq!(json["data"]["image_ref"], "https://cdn.example.com/forest.webp");
    assert_eq!(json["data"]["format"], "webp");
}

#[tokio::test]
async fn add_item_without_image_is_rejected() {
    let (app, _) = common::build_test_app();
    let response = post_json(
        app,
        "/v1/gallery",
        json!({ "prompt": "nothing", "image_ref": "" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn add_item_with_overlong_prompt_is_rejected() {
    let (app, state) = common::build_test_app();
    let response = post_json(
        app,
        "/v1/gallery",
        json!({ "prompt": "c".repeat(MAX_PROMPT_LEN + 1), "image_ref": "https://x/1.jpg" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_INPUT");
    assert!(state.gallery.is_empty());
}

// ---------------------------------------------------------------------------
// Test: GET /v1/gallery lists newest first with filters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_is_newest_first_and_filterable() {
    let (app, _) = common::build_test_app();
    add(&app, json!({ "prompt": "Sunset over hills", "image_ref": "https://x/1.jpg" })).await;
    add(
        &app,
        json!({ "kind": "edit", "prompt": "city at night", "image_ref": "https://x/2.jpg" }),
    )
    .await;
    add(
        &app,
        json!({ "kind": "edit", "prompt": "beach sunset", "image_ref": "https://x/3.jpg" }),
    )
    .await;

    let all = list(&app, "").await;
    assert_eq!(
        prompts(&all),
        ["beach sunset", "city at night", "Sunset over hills"]
    );

    let sunsets = list(&app, "?search=SUNSET").await;
    assert_eq!(prompts(&sunsets), ["beach sunset", "Sunset over hills"]);

    let edits = list(&app, "?kind=edit").await;
    assert_eq!(prompts(&edits), ["beach sunset", "city at night"]);

    let limited = list(&app, "?limit=1").await;
    assert_eq!(prompts(&limited), ["beach sunset"]);

    let combined = list(&app, "?kind=create&search=sunset").await;
    assert_eq!(prompts(&combined), ["Sunset over hills"]);
}

#[tokio::test]
async fn invalid_kind_filter_returns_bad_request() {
    let (app, _) = common::build_test_app();
    let response = get(app, "/v1/gallery?kind=painting").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

// ---------------------------------------------------------------------------
// Test: get and delete by id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_then_delete_item() {
    let (app, _) = common::build_test_app();
    let id = add(&app, json!({ "prompt": "owl", "image_ref": "https://x/owl.png" })).await;

    let response = get(app.clone(), &format!("/v1/gallery/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["prompt"], "owl");

    let response = delete(app.clone(), &format!("/v1/gallery/{id}")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get(app.clone(), &format!("/v1/gallery/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = delete(app, &format!("/v1/gallery/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_item_id_returns_404() {
    let (app, _) = common::build_test_app();
    let response = get(app, "/v1/gallery/42").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: a full gallery evicts its oldest item
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_gallery_evicts_oldest() {
    let mut config = common::test_config();
    config.engine.gallery_capacity = 3;
    let (app, state) = common::build_test_app_with(config, Arc::new(MockBackend::new()));

    let first = add(&app, json!({ "prompt": "A", "image_ref": "https://x/a.jpg" })).await;
    for prompt in ["B", "C", "D"] {
        add(&app, json!({ "prompt": prompt, "image_ref": "https://x/i.jpg" })).await;
    }

    assert_eq!(state.gallery.len(), 3);
    assert_eq!(prompts(&list(&app, "").await), ["D", "C", "B"]);

    let response = get(app, &format!("/v1/gallery/{first}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
