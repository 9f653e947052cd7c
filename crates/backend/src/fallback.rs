//! Serves a placeholder image when the wrapped backend fails.
//!
//! Time-outs are passed through untouched so the task still reports them.

use std::sync::Arc;

use async_trait::async_trait;
use banana_core::backend::{BackendError, ImageBackend, ProgressSink};
use banana_core::task::{FailureKind, GenerationRequest, ImageFormat, ImageResult};

pub struct FallbackBackend {
    inner: Arc<dyn ImageBackend>,
    placeholder_url: String,
}

impl FallbackBackend {
    pub fn new(inner: Arc<dyn ImageBackend>, placeholder_url: impl Into<String>) -> Self {
        Self {
            inner,
            placeholder_url: placeholder_url.into(),
        }
    }

    fn placeholder(&self) -> ImageResult {
        ImageResult {
            url: self.placeholder_url.clone(),
            format: ImageFormat::from_url(&self.placeholder_url).unwrap_or(ImageFormat::Jpeg),
        }
    }
}

#[async_trait]
impl ImageBackend for FallbackBackend {
    async fn generate(
        &self,
        request: &GenerationRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ImageResult, BackendError> {
        match self.inner.generate(request, progress).await {
            Ok(result) => Ok(result),
            Err(e) if e.failure_kind() == FailureKind::Timeout => Err(e),
            Err(e) => {
                tracing::warn!(
                    backend = self.inner.name(),
                    error = %e,
                    "Backend failed, serving placeholder image",
                );
                Ok(self.placeholder())
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
