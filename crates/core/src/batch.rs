//! Batch records, size validation and the derived batch status.
//!
//! A batch never fails as a whole. It is `running` while any child task is
//! non-terminal and `done` once every child is `complete` or `failed`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::task::{GenerationParams, Stage, Task};
use crate::types::{BatchId, TaskId, Timestamp};

/// Default maximum number of images in one batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;

const ENTITY: &str = "Batch";

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Reject empty batches and batches larger than `max`.
pub fn validate_batch_size(len: usize, max: usize) -> Result<(), CoreError> {
    if len == 0 {
        return Err(CoreError::InvalidInput(
            "Batch must contain at least one image".to_string(),
        ));
    }
    if len > max {
        return Err(CoreError::InvalidInput(format!(
            "Batch of {len} images exceeds the maximum of {max}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A group of tasks sharing one prompt and parameter set.
///
/// `task_ids` is in input order, regardless of completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: BatchId,
    pub task_ids: Vec<TaskId>,
    pub prompt: String,
    pub params: GenerationParams,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Running,
    Done,
}

/// Point-in-time view of a batch and its children.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSnapshot {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub all_done: bool,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub task_ids: Vec<TaskId>,
    pub tasks: Vec<Task>,
    pub created_at: Timestamp,
}

impl BatchSnapshot {
    /// Aggregate child snapshots, which must be in the batch's input order.
    pub fn aggregate(job: &BatchJob, tasks: Vec<Task>) -> Self {
        let completed = count_stage(&tasks, Stage::Complete);
        let failed = count_stage(&tasks, Stage::Failed);
        let all_done = tasks.iter().all(Task::is_terminal);

        Self {
            batch_id: job.id,
            status: if all_done {
                BatchStatus::Done
            } else {
                BatchStatus::Running
            },
            all_done,
            total: job.task_ids.len(),
            completed,
            failed,
            task_ids: job.task_ids.clone(),
            tasks,
            created_at: job.created_at,
        }
    }

    /// Latest update time across children, if the batch is done.
    pub fn finished_at(&self) -> Option<Timestamp> {
        if !self.all_done {
            return None;
        }
        self.tasks.iter().map(|t| t.updated_at).max()
    }
}

fn count_stage(tasks: &[Task], stage: Stage) -> usize {
    tasks.iter().filter(|t| t.stage == stage).count()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// In-memory batch id -> [`BatchJob`] map.
#[derive(Default)]
pub struct BatchRegistry {
    batches: RwLock<HashMap<BatchId, BatchJob>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: BatchJob) -> Result<(), CoreError> {
        let mut batches = self.batches.write().unwrap_or_else(PoisonError::into_inner);
        if batches.contains_key(&job.id) {
            return Err(CoreError::Conflict(format!(
                "Batch {} is already registered",
                job.id
            )));
        }
        batches.insert(job.id, job);
        Ok(())
    }

    pub fn get(&self, id: BatchId) -> Result<BatchJob, CoreError> {
        self.batches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(ENTITY, id))
    }

    pub fn remove(&self, id: BatchId) -> Option<BatchJob> {
        self.batches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn ids(&self) -> Vec<BatchId> {
        self.batches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.batches.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use uuid::Uuid;

    use super::*;
    use crate::task::{FailureKind, TaskError, TaskKind};

    fn job(n: usize) -> BatchJob {
        BatchJob {
            id: Uuid::new_v4(),
            task_ids: (0..n).map(|_| Uuid::new_v4()).collect(),
            prompt: "make it blue".into(),
            params: GenerationParams::default(),
            created_at: chrono::Utc::now(),
        }
    }

    fn task_in(id: TaskId, stage: Stage) -> Task {
        let mut task = Task::new(id, TaskKind::Edit, "make it blue");
        task.stage = stage;
        if stage == Stage::Failed {
            task.error = Some(TaskError::new(FailureKind::BackendFailure, "boom"));
        }
        task
    }

    #[test]
    fn batch_size_bounds() {
        assert_matches!(validate_batch_size(0, 10), Err(CoreError::InvalidInput(_)));
        assert_matches!(validate_batch_size(11, 10), Err(CoreError::InvalidInput(_)));
        assert!(validate_batch_size(1, 10).is_ok());
        assert!(validate_batch_size(10, 10).is_ok());
    }

    #[test]
    fn running_while_any_child_is_open() {
        let job = job(2);
        let tasks = vec![
            task_in(job.task_ids[0], Stage::Complete),
            task_in(job.task_ids[1], Stage::Generating),
        ];
        let snapshot = BatchSnapshot::aggregate(&job, tasks);
        assert_eq!(snapshot.status, BatchStatus::Running);
        assert!(!snapshot.all_done);
        assert!(snapshot.finished_at().is_none());
    }

    #[test]
    fn partial_failure_is_still_done() {
        let job = job(3);
        let tasks = vec![
            task_in(job.task_ids[0], Stage::Complete),
            task_in(job.task_ids[1], Stage::Failed),
            task_in(job.task_ids[2], Stage::Complete),
        ];
        let snapshot = BatchSnapshot::aggregate(&job, tasks);
        assert_eq!(snapshot.status, BatchStatus::Done);
        assert!(snapshot.all_done);
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.task_ids, job.task_ids);
        assert!(snapshot.finished_at().is_some());
    }

    #[test]
    fn registry_round_trip_and_not_found() {
        let registry = BatchRegistry::new();
        let job = job(1);
        let id = job.id;
        registry.insert(job.clone()).unwrap();

        assert_eq!(registry.get(id).unwrap(), job);
        assert_matches!(registry.insert(job), Err(CoreError::Conflict(_)));
        assert_eq!(registry.ids(), vec![id]);

        registry.remove(id);
        assert_matches!(registry.get(id), Err(CoreError::NotFound { .. }));
        assert!(registry.is_empty());
    }
}
