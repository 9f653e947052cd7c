//! Handlers for single image generation / edit submissions.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use banana_core::task::{GenerationParams, GenerationRequest, ImageFormat, Stage, TaskKind};
use banana_core::types::{TaskId, Timestamp};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::PROMPT_MAX_LEN;
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /v1/image/generations`.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerationBody {
    #[validate(length(min = 1, max = PROMPT_MAX_LEN, message = "Prompt must be 1-2000 characters"))]
    pub prompt: String,
    /// Image to edit. Omit for a fresh generation.
    #[serde(default, alias = "image", alias = "image_url")]
    pub source_image: Option<String>,
    #[validate(range(min = 0.0, max = 1.0, message = "strength must be between 0 and 1"))]
    pub strength: Option<f32>,
    pub format: Option<ImageFormat>,
    pub negative_prompt: Option<String>,
    pub style: Option<String>,
    pub seed: Option<u64>,
    pub resolution: Option<String>,
    /// Overrides the server's auto-save setting for this task.
    pub save_to_gallery: Option<bool>,
}

impl GenerationBody {
    fn into_request(self) -> (GenerationRequest, Option<bool>) {
        let params = GenerationParams {
            strength: self.strength,
            format: self.format,
            negative_prompt: self.negative_prompt,
            style: self.style,
            seed: self.seed,
            resolution: self.resolution,
        };
        (
            GenerationRequest::new(self.prompt, self.source_image, params),
            self.save_to_gallery,
        )
    }
}

/// Returned as soon as the task is registered.
#[derive(Debug, Serialize)]
pub struct TaskAccepted {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub stage: Stage,
    pub percent: u8,
    pub created_at: Timestamp,
}

/// POST /v1/image/generations
///
/// Register a task and start it in the background. Returns 202 with the
/// task id; poll `/v1/progress/{task_id}` for the outcome.
pub async fn create_generation(
    State(state): State<AppState>,
    body: Result<Json<GenerationBody>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(body) = body?;
    body.validate()?;

    let (request, save_override) = body.into_request();
    let save = save_override.unwrap_or(state.config.engine.auto_save_to_gallery);
    let task = state.orchestrator.submit(request, save)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: TaskAccepted {
                task_id: task.id,
                kind: task.kind,
                stage: task.stage,
                percent: task.percent,
                created_at: task.created_at,
            },
        }),
    ))
}
