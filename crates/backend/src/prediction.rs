//! [`ImageBackend`] over the hosted prediction service: submit once, then
//! poll the session until it succeeds, fails or reports a time-out.
//!
//! No submission retry is performed. Transport errors while polling are
//! tolerated up to [`MAX_CONSECUTIVE_POLL_ERRORS`] in a row. The overall
//! deadline is enforced by the caller.

use std::time::Duration;

use async_trait::async_trait;
use banana_core::backend::{BackendError, ImageBackend, ProgressSink};
use banana_core::task::{GenerationRequest, ImageFormat, ImageResult};

use crate::api::{PredictionApi, PredictionService, PredictionStatus, StatusResponse, CODE_OK};

/// Consecutive failed polls after which the task is failed.
pub const MAX_CONSECUTIVE_POLL_ERRORS: u32 = 5;

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct PredictionBackend<S = PredictionApi> {
    service: S,
    poll_interval: Duration,
    /// Starting image used when a create request carries none; the service
    /// always needs one.
    default_source_image: String,
}

impl<S: PredictionService> PredictionBackend<S> {
    pub fn new(service: S, default_source_image: impl Into<String>) -> Self {
        Self {
            service,
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_source_image: default_source_image.into(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let source = request
            .source_image
            .clone()
            .unwrap_or_else(|| self.default_source_image.clone());

        let response = self.service.submit(&request.prompt, &[source]).await?;
        match response.session_id() {
            Some(session_id) => Ok(session_id.to_string()),
            None if response.code == CODE_OK => Err(BackendError::Rejected(
                "Submission accepted without a session id".to_string(),
            )),
            None => Err(BackendError::Rejected(format!(
                "{} (code {})",
                non_empty(&response.message, "submission refused"),
                response.code
            ))),
        }
    }

    async fn poll(
        &self,
        session_id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<String, BackendError> {
        let mut consecutive_errors = 0u32;

        loop {
            match self.service.status(session_id).await {
                Ok(response) => {
                    consecutive_errors = 0;
                    if let Some(url) = interpret_status(&response, progress)? {
                        return Ok(url);
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        session_id,
                        consecutive_errors,
                        error = %e,
                        "Prediction status poll failed",
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_POLL_ERRORS {
                        return Err(BackendError::Request(format!(
                            "Polling failed after {MAX_CONSECUTIVE_POLL_ERRORS} consecutive errors: {e}"
                        )));
                    }
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Turn one status response into a result URL (`Some`), a pending state
/// (`None`, progress reported) or an error.
fn interpret_status(
    response: &StatusResponse,
    progress: &dyn ProgressSink,
) -> Result<Option<String>, BackendError> {
    if response.reports_timeout() {
        return Err(BackendError::Timeout(
            "Session timed out on the prediction service".to_string(),
        ));
    }
    if response.code != CODE_OK {
        return Err(BackendError::Rejected(
            non_empty(&response.message, "status request refused").to_string(),
        ));
    }

    let Some(result) = response.first_result() else {
        return Ok(None);
    };

    match result.status {
        PredictionStatus::Succeeded => result
            .urls
            .first()
            .cloned()
            .map(Some)
            .ok_or(BackendError::EmptyResult),
        PredictionStatus::Failed => Err(BackendError::Rejected(
            result
                .error
                .clone()
                .unwrap_or_else(|| "Generation failed".to_string()),
        )),
        status => {
            let percent = result.progress.unwrap_or(0.0).clamp(0.0, 100.0) as u8;
            progress.report(percent, &format!("{status:?} ({percent}%)").to_lowercase());
            Ok(None)
        }
    }
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[async_trait]
impl<S: PredictionService> ImageBackend for PredictionBackend<S> {
    async fn generate(
        &self,
        request: &GenerationRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ImageResult, BackendError> {
        let session_id = self.submit(request).await?;
        tracing::info!(session_id = %session_id, "Prediction submitted");

        let url = self.poll(&session_id, progress).await?;
        let format = ImageFormat::from_url(&url).unwrap_or(ImageFormat::Jpeg);
        tracing::info!(session_id = %session_id, url = %url, %format, "Prediction succeeded");

        Ok(ImageResult { url, format })
    }

    fn name(&self) -> &str {
        "prediction"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
