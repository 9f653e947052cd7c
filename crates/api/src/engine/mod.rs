//! Task execution engine: the single-task orchestrator, the batch
//! coordinator, and construction of the configured backend and host.

pub mod batch;
pub mod orchestrator;

use std::sync::Arc;
use std::time::Duration;

use banana_backend::api::PredictionApi;
use banana_backend::fallback::FallbackBackend;
use banana_backend::host::{PassthroughHost, UploadHost};
use banana_backend::mock::MockBackend;
use banana_backend::prediction::PredictionBackend;
use banana_core::backend::{ImageBackend, ImageHost};

use crate::config::{BackendConfig, BackendKind};

pub use batch::BatchCoordinator;
pub use orchestrator::TaskOrchestrator;

/// Latency range of the development mock backend.
const MOCK_LATENCY: (Duration, Duration) = (Duration::from_millis(500), Duration::from_millis(2000));

/// Build the backend selected by `config`, wrapped in the fallback provider
/// when enabled.
pub fn build_backend(config: &BackendConfig) -> Arc<dyn ImageBackend> {
    let backend: Arc<dyn ImageBackend> = match config.kind {
        BackendKind::Mock => {
            let (min, max) = MOCK_LATENCY;
            Arc::new(MockBackend::new().with_latency(min, max))
        }
        BackendKind::Prediction => Arc::new(
            PredictionBackend::new(
                PredictionApi::new(config.api_url.clone()),
                config.default_source_image.clone(),
            )
            .with_poll_interval(config.poll_interval),
        ),
    };

    if config.fallback_enabled {
        Arc::new(FallbackBackend::new(backend, config.fallback_image_url.clone()))
    } else {
        backend
    }
}

/// Build the image host: re-hosting when upload services are configured,
/// pass-through otherwise.
pub fn build_host(config: &BackendConfig) -> Arc<dyn ImageHost> {
    if config.upload_targets.is_empty() {
        return Arc::new(PassthroughHost);
    }
    Arc::new(UploadHost::new(config.upload_targets.clone()).with_referer(&config.api_url))
}
