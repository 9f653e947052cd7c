//! Task data model and the single-task lifecycle state machine.
//!
//! ```text
//! submitted -> generating -> uploading -> complete
//! submitted -> generating -> failed
//!                            uploading -> failed
//! ```
//!
//! Stages only move forward. A task may stay in `generating` or `uploading`
//! while its percent advances, but once `complete` or `failed` it is frozen.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{BatchId, TaskId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum accepted prompt length in characters.
pub const MAX_PROMPT_LEN: usize = 2000;

/// Percent reported once the backend call has started.
pub const PERCENT_GENERATING: u8 = 10;

/// Upper bound for percent while the backend is still generating.
pub const PERCENT_GENERATING_MAX: u8 = 85;

/// Percent reported while the result is being persisted.
pub const PERCENT_UPLOADING: u8 = 90;

/// Percent of any terminal task.
pub const PERCENT_DONE: u8 = 100;

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Whether a task creates a new image or edits a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Create,
    Edit,
}

impl TaskKind {
    /// `Edit` exactly when a source image is supplied.
    pub fn for_source(source_image: Option<&str>) -> Self {
        match source_image {
            Some(_) => Self::Edit,
            None => Self::Create,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Position of a task in its forward-only lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Submitted,
    Generating,
    Uploading,
    Complete,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether a task currently in `self` may be updated to `next`.
    ///
    /// Same-stage updates are allowed for the two working stages so the
    /// percent/message can advance; everything else must move forward along
    /// the state machine.
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Submitted, Generating)
                | (Generating, Generating)
                | (Generating, Uploading)
                | (Generating, Failed)
                | (Uploading, Uploading)
                | (Uploading, Complete)
                | (Uploading, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Generating => "generating",
            Self::Uploading => "uploading",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Image format
// ---------------------------------------------------------------------------

/// Output image format, either requested by a caller or reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    /// Parse a file extension (`jpg`, `JPEG`, `png`, ...).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Infer the format from the last path segment of a URL, ignoring any
    /// query string or fragment.
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file = path.rsplit('/').next()?;
        let (_, ext) = file.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
        })
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Optional knobs forwarded to the backend unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Edit strength in `0.0..=1.0`.
    pub strength: Option<f32>,
    /// Requested output format. Backends may ignore it.
    pub format: Option<ImageFormat>,
    pub negative_prompt: Option<String>,
    pub style: Option<String>,
    pub seed: Option<u64>,
    /// `WIDTHxHEIGHT`, e.g. `1024x1024`.
    pub resolution: Option<String>,
}

impl GenerationParams {
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(strength) = self.strength {
            if !(0.0..=1.0).contains(&strength) {
                return Err(CoreError::InvalidInput(format!(
                    "strength must be between 0 and 1, got {strength}"
                )));
            }
        }
        if let Some(ref resolution) = self.resolution {
            parse_resolution(resolution)?;
        }
        Ok(())
    }
}

/// Parse a `WIDTHxHEIGHT` string into its two dimensions.
pub fn parse_resolution(value: &str) -> Result<(u32, u32), CoreError> {
    let invalid = || {
        CoreError::InvalidInput(format!(
            "resolution must look like WIDTHxHEIGHT, got '{value}'"
        ))
    };
    let (w, h) = value.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
    let w: u32 = w.parse().map_err(|_| invalid())?;
    let h: u32 = h.parse().map_err(|_| invalid())?;
    if w == 0 || h == 0 {
        return Err(invalid());
    }
    Ok((w, h))
}

/// Reject empty, whitespace-only or oversized prompts.
pub fn validate_prompt(prompt: &str) -> Result<(), CoreError> {
    if prompt.trim().is_empty() {
        return Err(CoreError::InvalidInput("Prompt cannot be empty".to_string()));
    }
    if prompt.chars().count() > MAX_PROMPT_LEN {
        return Err(CoreError::InvalidInput(format!(
            "Prompt must not exceed {MAX_PROMPT_LEN} characters"
        )));
    }
    Ok(())
}

/// Everything the backend needs for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Reference (URL or local path) of the image to edit.
    pub source_image: Option<String>,
    pub params: GenerationParams,
}

impl GenerationRequest {
    /// Build a request, normalising a blank source image to `None`.
    pub fn new(
        prompt: impl Into<String>,
        source_image: Option<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            source_image: source_image.filter(|s| !s.trim().is_empty()),
            params,
        }
    }

    pub fn kind(&self) -> TaskKind {
        TaskKind::for_source(self.source_image.as_deref())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_prompt(&self.prompt)?;
        self.params.validate()
    }
}

// ---------------------------------------------------------------------------
// Results and errors
// ---------------------------------------------------------------------------

/// What a backend produced: a reference to the image and the format it
/// actually used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResult {
    pub url: String,
    pub format: ImageFormat,
}

/// Result stored on a completed task.
///
/// `actual_format` is authoritative for naming and labelling; the requested
/// one is kept only so callers can see when it was ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub image_ref: String,
    pub requested_format: Option<ImageFormat>,
    pub actual_format: ImageFormat,
    pub revised_prompt: String,
}

impl TaskResult {
    /// Whether the backend produced something other than what was asked.
    pub fn format_mismatch(&self) -> bool {
        self.requested_format
            .is_some_and(|requested| requested != self.actual_format)
    }
}

/// Classification of a terminal task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    BackendFailure,
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BackendFailure => "backend_failure",
            Self::Timeout => "timeout",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// One generation/edit attempt and its current progress.
///
/// Values handed out by the tracker are snapshots; mutating them has no
/// effect on the tracked task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
    pub stage: Stage,
    /// Advisory, non-decreasing, `0..=100`.
    pub percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// A freshly submitted task: stage `submitted`, percent 0.
    pub fn new(id: TaskId, kind: TaskKind, prompt: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            kind,
            prompt: prompt.into(),
            batch_id: None,
            stage: Stage::Submitted,
            percent: 0,
            message: "Task submitted".to_string(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_batch(mut self, batch_id: BatchId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
