use std::sync::Arc;

use banana_core::backend::{ImageBackend, ImageHost};
use banana_core::batch::BatchRegistry;
use banana_core::gallery::GalleryStore;
use banana_core::progress::ProgressTracker;

use crate::config::ServerConfig;
use crate::engine::{BatchCoordinator, TaskOrchestrator};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`). Each instance
/// owns its own stores, so tests get isolated state per app.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Single-task engine; owns the progress tracker.
    pub orchestrator: Arc<TaskOrchestrator>,
    /// Batch engine; owns the batch registry.
    pub batches: Arc<BatchCoordinator>,
    /// Completed results.
    pub gallery: Arc<GalleryStore>,
}

impl AppState {
    /// Wire fresh stores and engines around the given backend and host.
    pub fn new(
        config: ServerConfig,
        backend: Arc<dyn ImageBackend>,
        host: Arc<dyn ImageHost>,
    ) -> Self {
        let engine = &config.engine;
        let tracker = Arc::new(ProgressTracker::default());
        let gallery = Arc::new(GalleryStore::new(engine.gallery_capacity));

        let orchestrator = Arc::new(TaskOrchestrator::new(
            tracker,
            Arc::clone(&gallery),
            backend,
            host,
            engine.backend_timeout,
        ));
        let batches = Arc::new(BatchCoordinator::new(
            Arc::clone(&orchestrator),
            Arc::new(BatchRegistry::new()),
            engine.batch_workers,
            engine.max_batch_size,
        ));

        Self {
            config: Arc::new(config),
            orchestrator,
            batches,
            gallery,
        }
    }
}
