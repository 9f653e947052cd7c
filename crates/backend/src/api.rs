//! REST API client for the hosted prediction service.
//!
//! Two endpoints are used: `POST /prediction/handle` queues a job and
//! returns a session id, `GET /prediction/get-status` reports its state.
//! Both answer with an envelope whose `code` is [`CODE_OK`] on success.

use async_trait::async_trait;
use banana_core::backend::BackendError;
use serde::Deserialize;

/// Envelope code meaning "accepted" / "ok".
pub const CODE_OK: i64 = 100_000;

/// Prediction type for image-to-image generation.
const PREDICTION_TYPE: u32 = 61;

/// Sub-type used together with [`PREDICTION_TYPE`].
const PREDICTION_SUB_TYPE: u32 = 2;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Response to a job submission.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<SubmitData>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitData {
    pub session_id: Option<String>,
}

impl SubmitResponse {
    /// The session id when the submission was accepted.
    pub fn session_id(&self) -> Option<&str> {
        if self.code != CODE_OK {
            return None;
        }
        self.data.as_ref()?.session_id.as_deref()
    }
}

/// Response to a status poll.
#[derive(Debug, Default, Deserialize)]
pub struct StatusResponse {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<StatusData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusData {
    #[serde(default)]
    pub results: Vec<PredictionResult>,
}

/// State of one prediction inside a session.
#[derive(Debug, Default, Deserialize)]
pub struct PredictionResult {
    #[serde(default)]
    pub status: PredictionStatus,
    pub progress: Option<f64>,
    #[serde(default)]
    pub urls: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Queued,
    Starting,
    Processing,
    Succeeded,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl StatusResponse {
    /// Whether the service says the session timed out on its side.
    pub fn reports_timeout(&self) -> bool {
        let message = self.message.to_lowercase();
        message.contains("time") && message.contains("out")
    }

    pub fn first_result(&self) -> Option<&PredictionResult> {
        self.data.as_ref()?.results.first()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the prediction REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum PredictionApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Prediction API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl From<PredictionApiError> for BackendError {
    fn from(err: PredictionApiError) -> Self {
        match err {
            PredictionApiError::Request(e) if e.is_timeout() => Self::Timeout(e.to_string()),
            PredictionApiError::Request(e) => Self::Request(e.to_string()),
            PredictionApiError::ApiError { status, body } => Self::Api { status, body },
        }
    }
}

// ---------------------------------------------------------------------------
// Service seam
// ---------------------------------------------------------------------------

/// The two calls the prediction backend needs. Implemented by
/// [`PredictionApi`] and by scripted stubs in tests.
#[async_trait]
pub trait PredictionService: Send + Sync {
    async fn submit(
        &self,
        prompt: &str,
        image_urls: &[String],
    ) -> Result<SubmitResponse, PredictionApiError>;

    async fn status(&self, session_id: &str) -> Result<StatusResponse, PredictionApiError>;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the prediction service.
pub struct PredictionApi {
    client: reqwest::Client,
    api_url: String,
}

impl PredictionApi {
    /// * `api_url` - Base URL, e.g. `https://visualgpt.io/api/v1`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling).
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`PredictionApiError::ApiError`]
    /// carrying the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PredictionApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PredictionApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PredictionApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl PredictionService for PredictionApi {
    async fn submit(
        &self,
        prompt: &str,
        image_urls: &[String],
    ) -> Result<SubmitResponse, PredictionApiError> {
        let body = serde_json::json!({
            "image_urls": image_urls,
            "type": PREDICTION_TYPE,
            "user_prompt": prompt,
            "sub_type": PREDICTION_SUB_TYPE,
        });

        let response = self
            .client
            .post(format!("{}/prediction/handle", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn status(&self, session_id: &str) -> Result<StatusResponse, PredictionApiError> {
        let response = self
            .client
            .get(format!("{}/prediction/get-status", self.api_url))
            .query(&[("session_id", session_id)])
            .send()
            .await?;

        Self::parse_response(response).await
    }
}
