//! Image hosts: where a produced image ends up before a task completes.
//!
//! [`UploadHost`] downloads the backend's image and re-hosts it on a file
//! upload service, trying each configured service in turn, so the reference
//! outlives the backend's own storage.
//! [`PassthroughHost`] keeps the backend URL as is.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use banana_core::backend::{BackendError, ImageHost};
use banana_core::task::{ImageFormat, ImageResult};
use serde::Deserialize;

/// Downloads smaller than this are not treated as images.
pub const MIN_IMAGE_BYTES: usize = 1000;

/// Per-request timeout for download and upload.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser user agent for image downloads; some CDNs reject bare clients.
const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

// ---------------------------------------------------------------------------
// Pass-through
// ---------------------------------------------------------------------------

pub struct PassthroughHost;

#[async_trait]
impl ImageHost for PassthroughHost {
    async fn persist(&self, image: &ImageResult) -> Result<String, BackendError> {
        Ok(image.url.clone())
    }
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// How an upload service takes the file and reports where it landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStyle {
    /// `files[]` field, JSON `{success, files: [{url}]}` reply.
    FileList,
    /// `file` field, reply body is the bare URL.
    PlainText,
}

/// One upload service, tried in configured order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub url: String,
    pub style: UploadStyle,
}

impl UploadTarget {
    pub fn file_list(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            style: UploadStyle::FileList,
        }
    }

    pub fn plain_text(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            style: UploadStyle::PlainText,
        }
    }

    /// Parse `URL`, `json=URL` or `text=URL`. A bare URL is a file-list
    /// service.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let target = match raw.split_once('=') {
            Some(("json", url)) => Self::file_list(url.trim()),
            Some(("text", url)) => Self::plain_text(url.trim()),
            _ => Self::file_list(raw),
        };
        let scheme_ok = target.url.starts_with("http://") || target.url.starts_with("https://");
        scheme_ok.then_some(target)
    }

    fn field(&self) -> &'static str {
        match self.style {
            UploadStyle::FileList => "files[]",
            UploadStyle::PlainText => "file",
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    files: Vec<UploadedFile>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum UploadError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Downloaded content too small ({0} bytes)")]
    TooSmall(usize),

    #[error("Upload service returned no file url")]
    NoUrl,

    #[error("No upload service accepted the image")]
    Exhausted,
}

pub struct UploadHost {
    client: reqwest::Client,
    targets: Vec<UploadTarget>,
    /// Sent as `Referer` when downloading from the backend.
    referer: Option<String>,
}

impl UploadHost {
    pub fn new(targets: Vec<UploadTarget>) -> Self {
        Self {
            client: reqwest::Client::new(),
            targets,
            referer: None,
        }
    }

    /// Download with the origin of `url` as `Referer`. Some backends refuse
    /// hot-linked image fetches without it.
    pub fn with_referer(mut self, url: &str) -> Self {
        self.referer = reqwest::Url::parse(url)
            .ok()
            .map(|url| url.origin().ascii_serialization());
        self
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, UploadError> {
        let mut request = self
            .client
            .get(url)
            .timeout(TRANSFER_TIMEOUT)
            .header(reqwest::header::USER_AGENT, DOWNLOAD_USER_AGENT);
        if let Some(ref referer) = self.referer {
            request = request.header(reqwest::header::REFERER, referer);
        }

        let bytes = request
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if bytes.len() < MIN_IMAGE_BYTES {
            return Err(UploadError::TooSmall(bytes.len()));
        }
        Ok(bytes.to_vec())
    }

    async fn upload(&self, image: &ImageResult) -> Result<String, UploadError> {
        let bytes = self.download(&image.url).await?;
        tracing::debug!(bytes = bytes.len(), "Downloaded image for upload");

        let file_name = upload_file_name(&image.url, image.format);
        for target in &self.targets {
            match self.upload_to(target, &bytes, &file_name, image.format).await {
                Ok(url) => return Ok(url),
                Err(e) => tracing::warn!(
                    target = %target.url,
                    error = %e,
                    "Upload failed, trying next service",
                ),
            }
        }
        Err(UploadError::Exhausted)
    }

    async fn upload_to(
        &self,
        target: &UploadTarget,
        bytes: &[u8],
        file_name: &str,
        format: ImageFormat,
    ) -> Result<String, UploadError> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(format.mime_type())?;
        let form = reqwest::multipart::Form::new().part(target.field(), part);

        let response = self
            .client
            .post(&target.url)
            .timeout(TRANSFER_TIMEOUT)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        match target.style {
            UploadStyle::FileList => {
                let body: UploadResponse = response.json().await?;
                if !body.success {
                    return Err(UploadError::NoUrl);
                }
                body.files
                    .into_iter()
                    .find_map(|file| file.url)
                    .ok_or(UploadError::NoUrl)
            }
            UploadStyle::PlainText => {
                let text = response.text().await?;
                let url = text.trim();
                if url.starts_with("http") {
                    Ok(url.to_string())
                } else {
                    Err(UploadError::NoUrl)
                }
            }
        }
    }
}

#[async_trait]
impl ImageHost for UploadHost {
    /// Re-host the image. Any failure keeps the original URL.
    async fn persist(&self, image: &ImageResult) -> Result<String, BackendError> {
        match self.upload(image).await {
            Ok(url) => {
                tracing::info!(url = %url, "Image re-hosted");
                Ok(url)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    url = %image.url,
                    "Image upload failed, keeping original url",
                );
                Ok(image.url.clone())
            }
        }
    }
}

/// Last path segment of `url` when it has an extension, otherwise a
/// timestamped name with the format's extension.
fn upload_file_name(url: &str, format: ImageFormat) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if name.contains('.') && !name.starts_with('.') => name.to_string(),
        _ => {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            format!("generated_image_{secs}.{}", format.extension())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passthrough_keeps_url() {
        let image = ImageResult {
            url: "https://cdn.example.com/a.png".into(),
            format: ImageFormat::Png,
        };
        assert_eq!(PassthroughHost.persist(&image).await.unwrap(), image.url);
    }

    #[test]
    fn file_name_comes_from_url() {
        assert_eq!(
            upload_file_name("https://cdn.example.com/x/out.webp?sig=2", ImageFormat::Webp),
            "out.webp"
        );
    }

    #[test]
    fn file_name_falls_back_to_generated() {
        let name = upload_file_name("https://picsum.photos/1024/1024", ImageFormat::Jpeg);
        assert!(name.starts_with("generated_image_"));
        assert!(name.ends_with(".jpg"));
    }

    #[test]
    fn upload_response_without_files_has_no_url() {
        let response: UploadResponse =
            serde_json::from_value(serde_json::json!({ "success": true })).unwrap();
        assert!(response.files.is_empty());
    }

    #[tokio::test]
    async fn unreachable_upload_keeps_original_url() {
        // Nothing listens on port 9 of localhost; both transfers fail fast.
        let host = UploadHost::new(vec![UploadTarget::file_list("http://127.0.0.1:9/upload")]);
        let image = ImageResult {
            url: "http://127.0.0.1:9/image.jpg".into(),
            format: ImageFormat::Jpeg,
        };
        assert_eq!(host.persist(&image).await.unwrap(), image.url);
    }

    #[test]
    fn target_parsing() {
        assert_eq!(
            UploadTarget::parse("https://uguu.se/upload"),
            Some(UploadTarget::file_list("https://uguu.se/upload"))
        );
        assert_eq!(
            UploadTarget::parse(" text=https://0x0.st "),
            Some(UploadTarget::plain_text("https://0x0.st"))
        );
        assert_eq!(
            UploadTarget::parse("json=http://localhost:8000/up"),
            Some(UploadTarget::file_list("http://localhost:8000/up"))
        );
        assert_eq!(UploadTarget::parse("ftp://files.example"), None);
        assert_eq!(UploadTarget::parse("text="), None);
    }

    #[test]
    fn referer_is_the_backend_origin() {
        let host = UploadHost::new(Vec::new()).with_referer("https://visualgpt.io/api/v1/generate");
        assert_eq!(host.referer.as_deref(), Some("https://visualgpt.io"));

        let host = UploadHost::new(Vec::new()).with_referer("not a url");
        assert_eq!(host.referer, None);
    }

    // ---------------------------------------------------------------------------
    // Test: transfers against a local image host
    // ---------------------------------------------------------------------------

    const REFERER: &str = "http://backend.example";

    /// Image source that insists on browser headers, plus three upload
    /// services: one broken, one plain-text and one file-list.
    async fn spawn_services() -> String {
        use axum::http::{header, HeaderMap, StatusCode};
        use axum::routing::{get, post};

        async fn image(headers: HeaderMap) -> Result<Vec<u8>, StatusCode> {
            let agent = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok());
            let referer = headers.get(header::REFERER).and_then(|v| v.to_str().ok());
            match (agent, referer) {
                (Some(agent), Some(REFERER)) if agent.starts_with("Mozilla/5.0") => {
                    Ok(vec![0u8; 2048])
                }
                _ => Err(StatusCode::FORBIDDEN),
            }
        }

        let router = axum::Router::new()
            .route("/image.jpg", get(image))
            .route("/tiny.jpg", get(|| async { vec![0u8; 10] }))
            .route(
                "/broken",
                post(|_: axum::body::Bytes| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route(
                "/text",
                post(|_: axum::body::Bytes| async { "https://files.example/abc.jpg\n" }),
            )
            .route(
                "/json",
                post(|_: axum::body::Bytes| async {
                    axum::Json(serde_json::json!({
                        "success": true,
                        "files": [{ "url": "https://files.example/def.jpg" }]
                    }))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn jpeg(url: String) -> ImageResult {
        ImageResult {
            url,
            format: ImageFormat::Jpeg,
        }
    }

    #[tokio::test]
    async fn failed_service_falls_through_to_the_next() {
        let base = spawn_services().await;
        let host = UploadHost::new(vec![
            UploadTarget::file_list(format!("{base}/broken")),
            UploadTarget::plain_text(format!("{base}/text")),
            UploadTarget::file_list(format!("{base}/json")),
        ])
        .with_referer(REFERER);

        let url = host.persist(&jpeg(format!("{base}/image.jpg"))).await.unwrap();
        assert_eq!(url, "https://files.example/abc.jpg");
    }

    #[tokio::test]
    async fn file_list_reply_yields_first_url() {
        let base = spawn_services().await;
        let host = UploadHost::new(vec![UploadTarget::file_list(format!("{base}/json"))])
            .with_referer(REFERER);

        let url = host.persist(&jpeg(format!("{base}/image.jpg"))).await.unwrap();
        assert_eq!(url, "https://files.example/def.jpg");
    }

    #[tokio::test]
    async fn every_service_failing_keeps_original_url() {
        let base = spawn_services().await;
        let host = UploadHost::new(vec![
            UploadTarget::file_list(format!("{base}/broken")),
            UploadTarget::plain_text(format!("{base}/broken")),
        ])
        .with_referer(REFERER);

        let image = jpeg(format!("{base}/image.jpg"));
        assert_eq!(host.persist(&image).await.unwrap(), image.url);
    }

    #[tokio::test]
    async fn download_without_referer_keeps_original_url() {
        let base = spawn_services().await;
        let host = UploadHost::new(vec![UploadTarget::file_list(format!("{base}/json"))]);

        let image = jpeg(format!("{base}/image.jpg"));
        assert_eq!(host.persist(&image).await.unwrap(), image.url);
    }

    #[tokio::test]
    async fn tiny_download_keeps_original_url() {
        let base = spawn_services().await;
        let host = UploadHost::new(vec![UploadTarget::file_list(format!("{base}/json"))])
            .with_referer(REFERER);

        let image = jpeg(format!("{base}/tiny.jpg"));
        assert_eq!(host.persist(&image).await.unwrap(), image.url);
    }
}
