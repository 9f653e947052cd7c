//! Drives single generation tasks through their lifecycle.
//!
//! [`TaskOrchestrator::submit`] registers the task and returns at once;
//! the work runs on its own tokio task:
//!
//! 1. `generating` at 10%, backend call under the configured time bound,
//!    adapter milestones mapped into 10..=85%.
//! 2. `uploading` at 90%, result persisted through the [`ImageHost`].
//! 3. Optional gallery append, then `complete` at 100%.
//!
//! Any backend or host error (or panic) moves the task straight to
//! `failed`. Nothing is retried; a retry is a new submission.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use banana_core::backend::{ImageBackend, ImageHost, ProgressSink};
use banana_core::error::CoreError;
use banana_core::gallery::{GalleryItem, GalleryStore};
use banana_core::progress::ProgressTracker;
use banana_core::task::{
    FailureKind, GenerationRequest, ImageResult, Stage, Task, TaskError, TaskResult,
    PERCENT_GENERATING, PERCENT_GENERATING_MAX, PERCENT_UPLOADING,
};
use banana_core::types::{BatchId, TaskId};
use futures::FutureExt;
use uuid::Uuid;

pub struct TaskOrchestrator {
    tracker: Arc<ProgressTracker>,
    gallery: Arc<GalleryStore>,
    backend: Arc<dyn ImageBackend>,
    host: Arc<dyn ImageHost>,
    backend_timeout: Duration,
}

impl TaskOrchestrator {
    pub fn new(
        tracker: Arc<ProgressTracker>,
        gallery: Arc<GalleryStore>,
        backend: Arc<dyn ImageBackend>,
        host: Arc<dyn ImageHost>,
        backend_timeout: Duration,
    ) -> Self {
        Self {
            tracker,
            gallery,
            backend,
            host,
            backend_timeout,
        }
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate and register a task, then start driving it in the
    /// background. Returns the `submitted` snapshot without waiting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(
        self: &Arc<Self>,
        request: GenerationRequest,
        save_to_gallery: bool,
    ) -> Result<Task, CoreError> {
        request.validate()?;
        let task = self.register(&request, None)?;

        let this = Arc::clone(self);
        let task_id = task.id;
        tokio::spawn(async move { this.run(task_id, request, save_to_gallery).await });

        Ok(task)
    }

    /// Register a task in `submitted` without starting it.
    pub fn register(
        &self,
        request: &GenerationRequest,
        batch_id: Option<BatchId>,
    ) -> Result<Task, CoreError> {
        let mut task = Task::new(Uuid::new_v4(), request.kind(), request.prompt.clone());
        task.batch_id = batch_id;
        let task = self.tracker.insert(task)?;

        tracing::info!(
            task_id = %task.id,
            kind = %task.kind,
            batch_id = ?batch_id,
            "Task submitted",
        );
        Ok(task)
    }

    /// Snapshot of a task's current progress.
    pub fn get_progress(&self, task_id: TaskId) -> Result<Task, CoreError> {
        self.tracker.read(task_id)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Drive a registered task to a terminal stage.
    ///
    /// Backend failures end up in the task itself. An error here means the
    /// tracker refused an update, e.g. the task was evicted mid-flight.
    pub async fn run(&self, task_id: TaskId, request: GenerationRequest, save_to_gallery: bool) {
        if let Err(e) = self.drive(task_id, &request, save_to_gallery).await {
            tracing::error!(task_id = %task_id, error = %e, "Task driver stopped");
        }
    }

    async fn drive(
        &self,
        task_id: TaskId,
        request: &GenerationRequest,
        save_to_gallery: bool,
    ) -> Result<Task, CoreError> {
        self.tracker.update(
            task_id,
            Stage::Generating,
            PERCENT_GENERATING,
            "Generating image",
        )?;

        let image = match self.generate(task_id, request).await {
            Ok(image) => image,
            Err(error) => return self.fail(task_id, error),
        };

        self.tracker.update(
            task_id,
            Stage::Uploading,
            PERCENT_UPLOADING,
            "Uploading result",
        )?;

        let image_ref = match guarded(self.host.persist(&image)).await {
            Ok(image_ref) => image_ref,
            Err(error) => return self.fail(task_id, error),
        };

        let result = TaskResult {
            image_ref,
            requested_format: request.params.format,
            actual_format: image.format,
            revised_prompt: request.prompt.clone(),
        };
        if result.format_mismatch() {
            tracing::info!(
                task_id = %task_id,
                requested = ?result.requested_format,
                actual = %result.actual_format,
                "Backend ignored the requested format",
            );
        }

        // Gallery first so a caller that sees `complete` also sees the item.
        if save_to_gallery {
            let item = GalleryItem::new(request.kind(), &request.prompt, &result.image_ref)
                .with_format(result.actual_format)
                .with_task(task_id);
            match self.gallery.add(item) {
                Ok(Some(evicted)) => {
                    tracing::debug!(evicted = %evicted.id, "Gallery full, evicted oldest item")
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(task_id = %task_id, error = %e, "Gallery append failed"),
            }
        }

        let task = self.tracker.complete(task_id, result)?;
        tracing::info!(task_id = %task_id, "Task complete");
        Ok(task)
    }

    /// Call the backend under the time bound, reporting milestones into the
    /// tracker.
    async fn generate(
        &self,
        task_id: TaskId,
        request: &GenerationRequest,
    ) -> Result<ImageResult, TaskError> {
        let sink = TrackerProgress {
            tracker: &self.tracker,
            task_id,
        };
        let call = guarded(self.backend.generate(request, &sink));

        match tokio::time::timeout(self.backend_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TaskError::new(
                FailureKind::Timeout,
                format!(
                    "Backend did not respond within {}s",
                    self.backend_timeout.as_secs_f32()
                ),
            )),
        }
    }

    fn fail(&self, task_id: TaskId, error: TaskError) -> Result<Task, CoreError> {
        tracing::warn!(
            task_id = %task_id,
            kind = %error.kind,
            error = %error.message,
            "Task failed",
        );
        self.tracker.fail(task_id, error)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Await a backend/host future, classifying its error and turning a panic
/// into a `backend_failure`.
async fn guarded<T, F>(future: F) -> Result<T, TaskError>
where
    F: std::future::Future<Output = Result<T, banana_core::backend::BackendError>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskError::new(e.failure_kind(), e.to_string())),
        Err(payload) => Err(TaskError::new(
            FailureKind::BackendFailure,
            format!("Backend panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Maps adapter-reported percent (0..=100) into the `generating` range.
struct TrackerProgress<'a> {
    tracker: &'a ProgressTracker,
    task_id: TaskId,
}

impl ProgressSink for TrackerProgress<'_> {
    fn report(&self, percent: u8, message: &str) {
        let span = u32::from(PERCENT_GENERATING_MAX - PERCENT_GENERATING);
        let scaled = PERCENT_GENERATING as u32 + u32::from(percent.min(100)) * span / 100;
        if let Err(e) = self
            .tracker
            .update(self.task_id, Stage::Generating, scaled as u8, message)
        {
            tracing::debug!(task_id = %self.task_id, error = %e, "Dropped progress report");
        }
    }
}
