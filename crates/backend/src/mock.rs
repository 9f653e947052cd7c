//! Local stand-in for the hosted backend.
//!
//! Sleeps for a random latency while reporting 25/50/75 milestones, then
//! returns a synthetic image URL. Failures can be forced by a marker string
//! found in the prompt or source image. Used for development and tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use banana_core::backend::{BackendError, ImageBackend, ProgressSink};
use banana_core::task::{GenerationRequest, ImageFormat, ImageResult};
use rand::Rng;

/// Milestones reported while the simulated generation runs.
const MILESTONES: [u8; 3] = [25, 50, 75];

const MOCK_IMAGE_BASE: &str = "https://mock.banana.local/images";

pub struct MockBackend {
    min_latency: Duration,
    max_latency: Duration,
    /// Format always produced, regardless of the requested one.
    output_format: Option<ImageFormat>,
    fail_marker: Option<String>,
    calls: AtomicUsize,
}

impl MockBackend {
    /// Instant responses, honours the requested format (jpeg otherwise).
    pub fn new() -> Self {
        Self {
            min_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
            output_format: None,
            fail_marker: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Each call sleeps a uniformly random duration in `min..=max`.
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max.max(min);
        self
    }

    /// Always produce `format`, ignoring what the request asked for.
    pub fn with_output_format(mut self, format: ImageFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Fail any request whose prompt or source image contains `marker`.
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Number of `generate` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn latency(&self) -> Duration {
        if self.max_latency <= self.min_latency {
            return self.min_latency;
        }
        let min = self.min_latency.as_millis() as u64;
        let max = self.max_latency.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    fn should_fail(&self, request: &GenerationRequest) -> bool {
        let Some(marker) = self.fail_marker.as_deref() else {
            return false;
        };
        request.prompt.contains(marker)
            || request
                .source_image
                .as_deref()
                .is_some_and(|source| source.contains(marker))
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageBackend for MockBackend {
    async fn generate(
        &self,
        request: &GenerationRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ImageResult, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self.latency() / (MILESTONES.len() as u32 + 1);

        for percent in MILESTONES {
            tokio::time::sleep(step).await;
            progress.report(percent, &format!("Rendering ({percent}%)"));
        }
        tokio::time::sleep(step).await;

        if self.should_fail(request) {
            return Err(BackendError::Rejected(format!(
                "Mock backend refused call {call}"
            )));
        }

        let format = self
            .output_format
            .or(request.params.format)
            .unwrap_or(ImageFormat::Jpeg);

        Ok(ImageResult {
            url: format!("{MOCK_IMAGE_BASE}/{call}.{}", format.extension()),
            format,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use banana_core::backend::NoopProgress;
    use banana_core::task::GenerationParams;

    use super::*;

    fn request(prompt: &str, format: Option<ImageFormat>) -> GenerationRequest {
        GenerationRequest::new(
            prompt,
            None,
            GenerationParams {
                format,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn honours_requested_format_by_default() {
        let backend = MockBackend::new();
        let result = backend
            .generate(&request("a", Some(ImageFormat::Png)), &NoopProgress)
            .await
            .unwrap();
        assert_eq!(result.format, ImageFormat::Png);
        assert!(result.url.ends_with(".png"));
    }

    #[tokio::test]
    async fn fixed_output_format_overrides_request() {
        let backend = MockBackend::new().with_output_format(ImageFormat::Jpeg);
        let result = backend
            .generate(&request("a", Some(ImageFormat::Webp)), &NoopProgress)
            .await
            .unwrap();
        assert_eq!(result.format, ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn marker_forces_failure() {
        let backend = MockBackend::new().failing_on("[fail]");
        let err = backend
            .generate(&request("draw [fail]", None), &NoopProgress)
            .await
            .unwrap_err();
        assert_matches!(err, BackendError::Rejected(_));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn reports_milestones_in_order() {
        struct Recorder(Mutex<Vec<u8>>);
        impl ProgressSink for Recorder {
            fn report(&self, percent: u8, _message: &str) {
                self.0.lock().unwrap().push(percent);
            }
        }

        let recorder = Recorder(Mutex::new(Vec::new()));
        MockBackend::new()
            .generate(&request("a", None), &recorder)
            .await
            .unwrap();
        assert_eq!(*recorder.0.lock().unwrap(), vec![25, 50, 75]);
    }

    #[tokio::test]
    async fn urls_are_unique_per_call() {
        let backend = MockBackend::new();
        let a = backend.generate(&request("a", None), &NoopProgress).await.unwrap();
        let b = backend.generate(&request("b", None), &NoopProgress).await.unwrap();
        assert_ne!(a.url, b.url);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_stays_within_bounds() {
        let backend = MockBackend::new()
            .with_latency(Duration::from_millis(400), Duration::from_millis(800));
        let started = tokio::time::Instant::now();
        backend.generate(&request("a", None), &NoopProgress).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(396), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(900), "{elapsed:?}");
    }
}
