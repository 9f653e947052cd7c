//! Fans a batch out into one child task per image.
//!
//! All children are registered before any starts, so `get_batch` always
//! sees the full set. Children then run with at most `workers` in flight per
//! batch. A failed child never stops its siblings; successful children are
//! appended to the gallery as each one finishes.

use std::sync::Arc;

use banana_core::batch::{validate_batch_size, BatchJob, BatchRegistry, BatchSnapshot};
use banana_core::error::CoreError;
use banana_core::task::{validate_prompt, GenerationParams, GenerationRequest};
use banana_core::types::BatchId;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::orchestrator::TaskOrchestrator;

pub struct BatchCoordinator {
    orchestrator: Arc<TaskOrchestrator>,
    registry: Arc<BatchRegistry>,
    workers: usize,
    max_batch_size: usize,
}

impl BatchCoordinator {
    pub fn new(
        orchestrator: Arc<TaskOrchestrator>,
        registry: Arc<BatchRegistry>,
        workers: usize,
        max_batch_size: usize,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            workers,
            max_batch_size,
        }
    }

    pub fn registry(&self) -> &Arc<BatchRegistry> {
        &self.registry
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Register the batch and its children, then start them. Returns the
    /// batch record without waiting for any child.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit_batch(
        &self,
        images: Vec<String>,
        prompt: String,
        params: GenerationParams,
    ) -> Result<BatchJob, CoreError> {
        validate_batch_size(images.len(), self.max_batch_size)?;
        validate_prompt(&prompt)?;
        params.validate()?;
        if let Some(index) = images.iter().position(|image| image.trim().is_empty()) {
            return Err(CoreError::InvalidInput(format!(
                "Image {index} has an empty reference"
            )));
        }

        let batch_id = Uuid::new_v4();
        let requests: Vec<GenerationRequest> = images
            .into_iter()
            .map(|image| GenerationRequest::new(prompt.clone(), Some(image), params.clone()))
            .collect();

        let mut task_ids = Vec::with_capacity(requests.len());
        for request in &requests {
            task_ids.push(self.orchestrator.register(request, Some(batch_id))?.id);
        }

        let job = BatchJob {
            id: batch_id,
            task_ids: task_ids.clone(),
            prompt,
            params,
            created_at: chrono::Utc::now(),
        };
        self.registry.insert(job.clone())?;

        let width = self.workers.clamp(1, requests.len());
        let permits = Arc::new(Semaphore::new(width));
        tracing::info!(
            batch_id = %batch_id,
            tasks = task_ids.len(),
            workers = width,
            "Batch submitted",
        );

        for (task_id, request) in task_ids.into_iter().zip(requests) {
            let orchestrator = Arc::clone(&self.orchestrator);
            let permits = Arc::clone(&permits);
            tokio::spawn(async move {
                // The semaphore is never closed.
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                orchestrator.run(task_id, request, true).await;
            });
        }

        Ok(job)
    }

    /// Child snapshots in input order plus the derived batch status.
    pub fn get_batch(&self, batch_id: BatchId) -> Result<BatchSnapshot, CoreError> {
        let job = self.registry.get(batch_id)?;
        let tasks = self.orchestrator.tracker().read_many(&job.task_ids)?;
        Ok(BatchSnapshot::aggregate(&job, tasks))
    }
}
