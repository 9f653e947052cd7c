//! Collaborator boundary: the image-generation backend and the image host.
//!
//! Implementations live in the `banana-backend` crate. The orchestrator only
//! sees these traits, so tests can swap in stubs.

use async_trait::async_trait;

use crate::task::{FailureKind, GenerationRequest, ImageResult};

/// Errors raised at the backend boundary.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("Backend request failed: {0}")]
    Request(String),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The backend answered but refused or failed the job.
    #[error("Backend rejected the request: {0}")]
    Rejected(String),

    /// The backend reported, or we observed, a time-out.
    #[error("Backend timed out: {0}")]
    Timeout(String),

    /// The backend finished without producing an image.
    #[error("Backend returned no image")]
    EmptyResult,
}

impl BackendError {
    /// How a task that hit this error is classified.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            _ => FailureKind::BackendFailure,
        }
    }
}

/// Receives adapter-reported progress milestones.
///
/// `percent` is the backend's own view in `0..=100`; the receiver maps it
/// onto the task's `generating` range.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, message: &str);
}

/// A sink that drops every report.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _percent: u8, _message: &str) {}
}

/// Produces one image per call. May be slow, may fail, may ignore the
/// requested format; callers must read the format from the result.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ImageResult, BackendError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Persists a produced image and returns the reference clients should use.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn persist(&self, image: &ImageResult) -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_classify_as_timeout() {
        assert_eq!(
            BackendError::Timeout("slow".into()).failure_kind(),
            FailureKind::Timeout
        );
        assert_eq!(
            BackendError::Api {
                status: 502,
                body: "bad gateway".into()
            }
            .failure_kind(),
            FailureKind::BackendFailure
        );
        assert_eq!(BackendError::EmptyResult.failure_kind(), FailureKind::BackendFailure);
    }
}
