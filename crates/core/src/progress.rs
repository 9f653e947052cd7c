//! In-memory progress tracker: task id -> [`Task`].
//!
//! Every mutation runs under a per-task mutex and is validated against the
//! stage machine in [`crate::task::Stage`]. Readers always receive an owned
//! snapshot. Each accepted mutation is also broadcast to subscribers so
//! callers can push updates instead of polling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::broadcast;

use crate::error::CoreError;
use crate::task::{Stage, Task, TaskError, TaskKind, TaskResult, PERCENT_DONE};
use crate::types::{TaskId, Timestamp};

/// Default buffer capacity for the snapshot broadcast channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

const ENTITY: &str = "Task";

pub struct ProgressTracker {
    tasks: RwLock<HashMap<TaskId, Arc<Mutex<Task>>>>,
    sender: broadcast::Sender<Task>,
}

impl ProgressTracker {
    /// Create a tracker whose broadcast channel buffers `capacity` snapshots.
    ///
    /// Slow subscribers observe `RecvError::Lagged` once the buffer fills.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            tasks: RwLock::new(HashMap::new()),
            sender,
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a new task in stage `submitted` with percent 0.
    pub fn create(&self, id: TaskId, kind: TaskKind, prompt: &str) -> Result<Task, CoreError> {
        self.insert(Task::new(id, kind, prompt))
    }

    /// Register a fully built task. Fails with `Conflict` if the id exists.
    pub fn insert(&self, task: Task) -> Result<Task, CoreError> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        if tasks.contains_key(&task.id) {
            return Err(CoreError::Conflict(format!(
                "Task {} is already registered",
                task.id
            )));
        }
        tasks.insert(task.id, Arc::new(Mutex::new(task.clone())));
        drop(tasks);

        self.publish(task.clone());
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Move a task to a working stage (`generating` or `uploading`).
    ///
    /// `percent` is clamped to 100 and never lowers the stored value.
    /// Terminal stages must go through [`complete`](Self::complete) or
    /// [`fail`](Self::fail) so result and error stay consistent with stage.
    pub fn update(
        &self,
        id: TaskId,
        stage: Stage,
        percent: u8,
        message: &str,
    ) -> Result<Task, CoreError> {
        if stage.is_terminal() {
            return Err(CoreError::InvalidInput(format!(
                "Stage '{stage}' must be set with its result or error"
            )));
        }
        self.mutate(id, stage, |task| {
            task.percent = task.percent.max(percent.min(PERCENT_DONE));
            task.message = message.to_string();
        })
    }

    /// Mark a task `complete` with its result.
    pub fn complete(&self, id: TaskId, result: TaskResult) -> Result<Task, CoreError> {
        self.mutate(id, Stage::Complete, |task| {
            task.percent = PERCENT_DONE;
            task.message = "Generation complete".to_string();
            task.result = Some(result);
        })
    }

    /// Mark a task `failed` with its classified error.
    pub fn fail(&self, id: TaskId, error: TaskError) -> Result<Task, CoreError> {
        self.mutate(id, Stage::Failed, |task| {
            task.percent = PERCENT_DONE;
            task.message = error.message.clone();
            task.error = Some(error);
        })
    }

    fn mutate(
        &self,
        id: TaskId,
        next: Stage,
        apply: impl FnOnce(&mut Task),
    ) -> Result<Task, CoreError> {
        let entry = self.entry(id)?;
        let mut task = lock(&entry);

        if !task.stage.can_advance_to(next) {
            return Err(CoreError::InvalidTransition {
                id,
                from: task.stage,
                to: next,
            });
        }

        task.stage = next;
        apply(&mut task);
        task.updated_at = chrono::Utc::now();

        let snapshot = task.clone();
        // Publish under the task lock so subscribers see this task's
        // snapshots in mutation order.
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Snapshot of a task. Fails with `NotFound` for unknown ids.
    pub fn read(&self, id: TaskId) -> Result<Task, CoreError> {
        let entry = self.entry(id)?;
        let task = lock(&entry).clone();
        Ok(task)
    }

    /// Snapshots of several tasks, in the order of `ids`.
    pub fn read_many(&self, ids: &[TaskId]) -> Result<Vec<Task>, CoreError> {
        ids.iter().map(|id| self.read(*id)).collect()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to every snapshot published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Task> {
        self.sender.subscribe()
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    /// Drop a task regardless of stage. Returns the last snapshot, if any.
    pub fn remove(&self, id: TaskId) -> Option<Task> {
        let removed = self
            .tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        removed.map(|entry| lock(&entry).clone())
    }

    /// Evict terminal tasks that do not belong to a batch and were last
    /// updated before `cutoff`. Returns the evicted ids.
    ///
    /// Batch children are left alone; their batch decides when they go.
    pub fn evict_finished_before(&self, cutoff: Timestamp) -> Vec<TaskId> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<TaskId> = tasks
            .iter()
            .filter(|(_, entry)| {
                let task = lock(entry);
                task.batch_id.is_none() && task.is_terminal() && task.updated_at < cutoff
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            tasks.remove(id);
        }
        expired
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn entry(&self, id: TaskId) -> Result<Arc<Mutex<Task>>, CoreError> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(ENTITY, id))
    }

    fn publish(&self, snapshot: Task) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.sender.send(snapshot);
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

fn lock(entry: &Mutex<Task>) -> MutexGuard<'_, Task> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
