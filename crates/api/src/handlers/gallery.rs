//! Handlers for the `/gallery` resource.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use banana_core::gallery::{GalleryItem, GalleryQuery};
use banana_core::task::{ImageFormat, TaskKind};
use banana_core::types::TaskId;
use serde::Deserialize;
use validator::Validate;

use super::{parse_id, PROMPT_MAX_LEN};
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

const ENTITY: &str = "GalleryItem";

/// Query parameters for `GET /v1/gallery`.
#[derive(Debug, Deserialize)]
pub struct GalleryParams {
    pub kind: Option<TaskKind>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

/// Body of `POST /v1/gallery`.
#[derive(Debug, Deserialize, Validate)]
pub struct NewGalleryItem {
    #[serde(default = "default_kind")]
    pub kind: TaskKind,
    #[validate(length(min = 1, max = PROMPT_MAX_LEN, message = "Prompt must be 1-2000 characters"))]
    pub prompt: String,
    #[serde(alias = "image_url", alias = "url")]
    #[validate(length(min = 1, message = "image_ref must not be empty"))]
    pub image_ref: String,
    pub format: Option<ImageFormat>,
    pub task_id: Option<TaskId>,
}

fn default_kind() -> TaskKind {
    TaskKind::Create
}

/// GET /v1/gallery?kind=&search=&limit=
///
/// Newest first.
pub async fn list_gallery(
    State(state): State<AppState>,
    params: Result<Query<GalleryParams>, QueryRejection>,
) -> AppResult<Json<DataResponse<Vec<GalleryItem>>>> {
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let items = state.gallery.list(&GalleryQuery {
        kind: params.kind,
        search: params.search,
        limit: params.limit,
    });
    Ok(Json(DataResponse { data: items }))
}

/// POST /v1/gallery
///
/// Append an item, evicting the oldest one when the gallery is full.
pub async fn add_gallery_item(
    State(state): State<AppState>,
    body: Result<Json<NewGalleryItem>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(body) = body?;
    body.validate()?;

    let mut item = GalleryItem::new(body.kind, body.prompt, body.image_ref);
    item.format = body.format;
    item.task_id = body.task_id;

    if let Some(evicted) = state.gallery.add(item.clone())? {
        tracing::debug!(evicted = %evicted.id, "Gallery full, evicted oldest item");
    }
    tracing::info!(item_id = %item.id, kind = %item.kind, "Gallery item added");

    Ok((StatusCode::CREATED, Json(DataResponse { data: item })))
}

/// GET /v1/gallery/{id}
pub async fn get_gallery_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<GalleryItem>>> {
    let id = parse_id(ENTITY, &id)?;
    Ok(Json(DataResponse {
        data: state.gallery.get(id)?,
    }))
}

/// DELETE /v1/gallery/{id}
///
/// 204 on success, 404 if the item does not exist.
pub async fn delete_gallery_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let id = parse_id(ENTITY, &id)?;
    state.gallery.delete(id)?;
    tracing::info!(item_id = %id, "Gallery item deleted");
    Ok(StatusCode::NO_CONTENT)
}
