//! Periodic eviction of finished tasks and batches.
//!
//! Standalone tasks go once they are terminal and older than the retention
//! period. A batch goes as a unit (record plus every child) once all its
//! children are terminal and the last one finished before the cutoff.
//! Tasks that are still running are never touched.

use std::sync::Arc;
use std::time::Duration;

use banana_core::batch::{BatchRegistry, BatchSnapshot};
use banana_core::progress::ProgressTracker;
use banana_core::types::Timestamp;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// What one sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub tasks: usize,
    pub batches: usize,
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    tracker: Arc<ProgressTracker>,
    batches: Arc<BatchRegistry>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    let Ok(retention_delta) = chrono::Duration::from_std(retention) else {
        tracing::warn!(?retention, "Task retention out of range, sweeper disabled");
        return;
    };

    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = interval.as_secs(),
        "Task retention job started"
    );

    let mut interval = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task retention job stopping");
                break;
            }
            _ = interval.tick() => {
                let report = sweep(&tracker, &batches, Utc::now() - retention_delta);
                if report.tasks > 0 {
                    tracing::info!(
                        tasks = report.tasks,
                        batches = report.batches,
                        "Task retention: evicted finished work"
                    );
                } else {
                    tracing::debug!("Task retention: nothing to evict");
                }
            }
        }
    }
}

/// Evict everything that finished before `cutoff`.
pub fn sweep(tracker: &ProgressTracker, batches: &BatchRegistry, cutoff: Timestamp) -> SweepReport {
    let mut report = SweepReport {
        tasks: tracker.evict_finished_before(cutoff).len(),
        batches: 0,
    };

    for batch_id in batches.ids() {
        let Ok(job) = batches.get(batch_id) else {
            continue;
        };
        let Ok(tasks) = tracker.read_many(&job.task_ids) else {
            continue;
        };
        let snapshot = BatchSnapshot::aggregate(&job, tasks);
        if !snapshot.finished_at().is_some_and(|at| at < cutoff) {
            continue;
        }

        // Record before children: readers never see a batch with holes.
        batches.remove(batch_id);
        for task_id in &job.task_ids {
            if tracker.remove(*task_id).is_some() {
                report.tasks += 1;
            }
        }
        report.batches += 1;
        tracing::debug!(batch_id = %batch_id, "Evicted finished batch");
    }

    report
}
