//! Handlers for batch submissions.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use banana_core::batch::{BatchSnapshot, BatchStatus};
use banana_core::task::{GenerationParams, ImageFormat};
use banana_core::types::{BatchId, TaskId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{parse_id, PROMPT_MAX_LEN};
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /v1/batch`: many source images, one shared prompt and
/// parameter set.
#[derive(Debug, Deserialize, Validate)]
pub struct BatchBody {
    #[serde(alias = "image_urls", alias = "source_images")]
    pub images: Vec<String>,
    #[validate(length(min = 1, max = PROMPT_MAX_LEN, message = "Prompt must be 1-2000 characters"))]
    pub prompt: String,
    #[validate(range(min = 0.0, max = 1.0, message = "strength must be between 0 and 1"))]
    pub strength: Option<f32>,
    pub format: Option<ImageFormat>,
    pub negative_prompt: Option<String>,
    pub style: Option<String>,
    pub seed: Option<u64>,
    pub resolution: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchAccepted {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub task_ids: Vec<TaskId>,
}

/// POST /v1/batch
///
/// Returns 202 with the batch id and child task ids in input order.
pub async fn submit_batch(
    State(state): State<AppState>,
    body: Result<Json<BatchBody>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(body) = body?;
    body.validate()?;

    let params = GenerationParams {
        strength: body.strength,
        format: body.format,
        negative_prompt: body.negative_prompt,
        style: body.style,
        seed: body.seed,
        resolution: body.resolution,
    };
    let job = state.batches.submit_batch(body.images, body.prompt, params)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: BatchAccepted {
                batch_id: job.id,
                status: BatchStatus::Running,
                task_ids: job.task_ids,
            },
        }),
    ))
}

/// GET /v1/batch/{batch_id}
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> AppResult<Json<DataResponse<BatchSnapshot>>> {
    let batch_id = parse_id("Batch", &batch_id)?;
    let snapshot = state.batches.get_batch(batch_id)?;
    Ok(Json(DataResponse { data: snapshot }))
}
