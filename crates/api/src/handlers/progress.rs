//! Handlers for task progress: polling and a Server-Sent Events feed.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use banana_core::progress::ProgressTracker;
use banana_core::task::{Stage, Task};
use banana_core::types::TaskId;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use super::parse_id;
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// SSE event name for task snapshots.
const EVENT_PROGRESS: &str = "progress";

/// GET /v1/progress/{task_id}
pub async fn get_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<DataResponse<Task>>> {
    let task_id = parse_id("Task", &task_id)?;
    let task = state.orchestrator.get_progress(task_id)?;
    Ok(Json(DataResponse { data: task }))
}

/// GET /v1/progress/{task_id}/events
///
/// Streams the current snapshot, then every update, and closes after the
/// terminal one.
pub async fn progress_events(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let task_id = parse_id("Task", &task_id)?;
    let tracker = Arc::clone(state.orchestrator.tracker());

    // Subscribe before reading so no update falls between the two.
    let updates = tracker.subscribe();
    let current = tracker.read(task_id)?;

    let feed = TaskFeed {
        task_id,
        tracker,
        pending: Some(current),
        updates: Some(updates),
        last_sent: None,
    };

    let events = stream::unfold(feed, |mut feed| async move {
        let task = feed.next_snapshot().await?;
        if task.is_terminal() {
            feed.updates = None;
        }
        Some((task, feed))
    })
    .map(|task| Ok(snapshot_event(&task)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn snapshot_event(task: &Task) -> Event {
    Event::default()
        .event(EVENT_PROGRESS)
        .id(format!("{}-{}", task.stage, task.percent))
        .json_data(task)
        .unwrap_or_else(|e| {
            tracing::error!(task_id = %task.id, error = %e, "Failed to encode progress event");
            Event::default().event(EVENT_PROGRESS).data("{}")
        })
}

/// Snapshots of one task: the initial read, then broadcast updates until
/// the task is terminal.
struct TaskFeed {
    task_id: TaskId,
    tracker: Arc<ProgressTracker>,
    pending: Option<Task>,
    updates: Option<broadcast::Receiver<Task>>,
    /// Last snapshot handed out.
    last_sent: Option<Task>,
}

impl TaskFeed {
    async fn next_snapshot(&mut self) -> Option<Task> {
        let task = match self.pending.take() {
            Some(task) => task,
            None => self.next_update().await?,
        };
        self.last_sent = Some(task.clone());
        Some(task)
    }

    async fn next_update(&mut self) -> Option<Task> {
        let updates = self.updates.as_mut()?;
        loop {
            let task = match updates.recv().await {
                Ok(task) if task.id == self.task_id => task,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(task_id = %self.task_id, skipped, "Progress feed lagged");
                    self.tracker.read(self.task_id).ok()?
                }
                Err(RecvError::Closed) => return None,
            };
            // Updates buffered before the initial read repeat or predate the
            // snapshot already sent.
            if !self.last_sent.as_ref().is_some_and(|last| is_stale(&task, last)) {
                return Some(task);
            }
        }
    }
}

/// Whether `task` adds nothing after `last` was sent.
fn is_stale(task: &Task, last: &Task) -> bool {
    task == last
        || task.updated_at < last.updated_at
        || stage_rank(task.stage) < stage_rank(last.stage)
        || (task.stage == last.stage && task.percent < last.percent)
}

fn stage_rank(stage: Stage) -> u8 {
    match stage {
        Stage::Submitted => 0,
        Stage::Generating => 1,
        Stage::Uploading => 2,
        Stage::Complete | Stage::Failed => 3,
    }
}

#[cfg(test)]
mod tests {
    use banana_core::task::{ImageFormat, TaskKind, TaskResult};
    use uuid::Uuid;

    use super::*;

    fn feed_after_initial_read(tracker: &Arc<ProgressTracker>, id: TaskId) -> TaskFeed {
        TaskFeed {
            task_id: id,
            tracker: Arc::clone(tracker),
            pending: None,
            updates: None,
            last_sent: None,
        }
    }

    #[tokio::test]
    async fn updates_buffered_before_the_initial_read_are_not_repeated() {
        let tracker = Arc::new(ProgressTracker::default());
        let id = Uuid::new_v4();
        let updates = tracker.subscribe();

        // Both land in the receiver before the handler reads the task.
        tracker.create(id, TaskKind::Create, "a heron").unwrap();
        tracker.update(id, Stage::Generating, 10, "Generating image").unwrap();
        let current = tracker.read(id).unwrap();

        let mut feed = feed_after_initial_read(&tracker, id);
        feed.pending = Some(current.clone());
        feed.updates = Some(updates);

        assert_eq!(feed.next_snapshot().await, Some(current));

        tracker.update(id, Stage::Uploading, 90, "Uploading result").unwrap();
        let next = feed.next_snapshot().await.unwrap();
        assert_eq!((next.stage, next.percent), (Stage::Uploading, 90));

        tracker
            .complete(
                id,
                TaskResult {
                    image_ref: "https://img.example.com/heron.jpg".into(),
                    requested_format: None,
                    actual_format: ImageFormat::Jpeg,
                    revised_prompt: "a heron".into(),
                },
            )
            .unwrap();
        let last = feed.next_snapshot().await.unwrap();
        assert_eq!(last.stage, Stage::Complete);
    }

    #[test]
    fn stale_check_keeps_forward_moves_with_equal_timestamps() {
        let mut last = Task::new(Uuid::new_v4(), TaskKind::Create, "x");
        last.stage = Stage::Generating;
        last.percent = 40;

        let mut same_instant = last.clone();
        same_instant.stage = Stage::Uploading;
        same_instant.percent = 90;
        assert!(!is_stale(&same_instant, &last));

        let mut earlier_stage = last.clone();
        earlier_stage.stage = Stage::Submitted;
        earlier_stage.percent = 0;
        assert!(is_stale(&earlier_stage, &last));

        assert!(is_stale(&last.clone(), &last));
    }
}
