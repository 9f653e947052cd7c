use std::time::Duration;

use banana_backend::host::UploadTarget;
use banana_core::batch::DEFAULT_MAX_BATCH_SIZE;
use banana_core::gallery::DEFAULT_GALLERY_CAPACITY;

/// Starting image sent to the prediction service for create requests.
pub const DEFAULT_SOURCE_IMAGE: &str =
    "https://images.unsplash.com/photo-1506744038136-46273834b3fb?w=1024";

/// Placeholder served by the fallback provider.
pub const DEFAULT_FALLBACK_IMAGE_URL: &str = "https://picsum.photos/1024/1024";

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: String,
    /// Bind port (default: `10000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
    pub engine: EngineConfig,
    pub backend: BackendConfig,
}

/// Limits and policies of the task engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on one backend call, including polling.
    pub backend_timeout: Duration,
    /// Per-batch worker-pool width.
    pub batch_workers: usize,
    pub max_batch_size: usize,
    pub gallery_capacity: usize,
    /// Append successful single tasks to the gallery.
    pub auto_save_to_gallery: bool,
    /// Terminal tasks older than this are evicted. `None` keeps them forever.
    pub task_retention: Option<Duration>,
    pub retention_sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(45),
            batch_workers: 3,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            gallery_capacity: DEFAULT_GALLERY_CAPACITY,
            auto_save_to_gallery: true,
            task_retention: Some(Duration::from_secs(3600)),
            retention_sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Mock,
    Prediction,
}

/// Which backend to talk to and how results are persisted.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub api_url: String,
    pub poll_interval: Duration,
    pub default_source_image: String,
    /// Re-host services, tried in order. Empty keeps backend URLs as they
    /// are.
    pub upload_targets: Vec<UploadTarget>,
    pub fallback_enabled: bool,
    pub fallback_image_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Mock,
            api_url: "https://visualgpt.io/api/v1".to_string(),
            poll_interval: Duration::from_millis(5000),
            default_source_image: DEFAULT_SOURCE_IMAGE.to_string(),
            upload_targets: Vec::new(),
            fallback_enabled: false,
            fallback_image_url: DEFAULT_FALLBACK_IMAGE_URL.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                        |
    /// |----------------------------|--------------------------------|
    /// | `HOST`                     | `127.0.0.1`                    |
    /// | `PORT`                     | `10000`                        |
    /// | `CORS_ORIGINS`             | `http://localhost:10000`       |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                           |
    /// | `LOG_FORMAT`               | `text` (`json` for JSON lines) |
    /// | `BACKEND_KIND`             | `mock` (or `prediction`)       |
    /// | `BACKEND_URL`              | `https://visualgpt.io/api/v1`  |
    /// | `BACKEND_TIMEOUT_SECS`     | `45`                           |
    /// | `BACKEND_POLL_INTERVAL_MS` | `5000`                         |
    /// | `DEFAULT_SOURCE_IMAGE`     | [`DEFAULT_SOURCE_IMAGE`]       |
    /// | `UPLOAD_URLS`              | unset (pass-through)           |
    /// | `UPLOAD_URL`               | single-service `UPLOAD_URLS`   |
    /// | `FALLBACK_ENABLED`         | `false`                        |
    /// | `FALLBACK_IMAGE_URL`       | `https://picsum.photos/1024/1024` |
    /// | `BATCH_WORKERS`            | `3`                            |
    /// | `MAX_BATCH_SIZE`           | `10`                           |
    /// | `GALLERY_CAPACITY`         | `100`                          |
    /// | `AUTO_SAVE_TO_GALLERY`     | `true`                         |
    /// | `TASK_RETENTION_SECS`      | `3600` (`0` keeps tasks)       |
    /// | `RETENTION_SWEEP_SECS`     | `60`                           |
    ///
    /// Panics on malformed values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into());

        let port: u16 = env_parse("PORT", "10000");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:10000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_parse("REQUEST_TIMEOUT_SECS", "30");

        let log_json = match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => true,
            Ok("text") | Err(_) => false,
            Ok(other) => panic!("LOG_FORMAT must be 'text' or 'json', got '{other}'"),
        };

        let retention_secs: u64 = env_parse("TASK_RETENTION_SECS", "3600");
        let max_batch_size: usize = env_parse("MAX_BATCH_SIZE", "10");
        let gallery_capacity: usize = env_parse("GALLERY_CAPACITY", "100");
        assert!(max_batch_size > 0, "MAX_BATCH_SIZE must be at least 1");
        assert!(gallery_capacity > 0, "GALLERY_CAPACITY must be at least 1");

        let engine = EngineConfig {
            backend_timeout: Duration::from_secs(env_parse("BACKEND_TIMEOUT_SECS", "45")),
            batch_workers: env_parse::<usize>("BATCH_WORKERS", "3").max(1),
            max_batch_size,
            gallery_capacity,
            auto_save_to_gallery: env_parse("AUTO_SAVE_TO_GALLERY", "true"),
            task_retention: (retention_secs > 0).then(|| Duration::from_secs(retention_secs)),
            retention_sweep_interval: Duration::from_secs(
                env_parse::<u64>("RETENTION_SWEEP_SECS", "60").max(1),
            ),
        };

        let kind = match std::env::var("BACKEND_KIND").as_deref() {
            Ok("mock") | Err(_) => BackendKind::Mock,
            Ok("prediction") => BackendKind::Prediction,
            Ok(other) => panic!("BACKEND_KIND must be 'mock' or 'prediction', got '{other}'"),
        };

        let defaults = BackendConfig::default();
        let backend = BackendConfig {
            kind,
            api_url: std::env::var("BACKEND_URL").unwrap_or(defaults.api_url),
            poll_interval: Duration::from_millis(env_parse("BACKEND_POLL_INTERVAL_MS", "5000")),
            default_source_image: std::env::var("DEFAULT_SOURCE_IMAGE")
                .unwrap_or(defaults.default_source_image),
            upload_targets: std::env::var("UPLOAD_URLS")
                .or_else(|_| std::env::var("UPLOAD_URL"))
                .map(|raw| parse_upload_targets(&raw))
                .unwrap_or_default(),
            fallback_enabled: env_parse("FALLBACK_ENABLED", "false"),
            fallback_image_url: std::env::var("FALLBACK_IMAGE_URL")
                .unwrap_or(defaults.fallback_image_url),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            log_json,
            engine,
            backend,
        }
    }
}

/// Comma-separated upload services. Each entry is `URL` or `json=URL` for a
/// file-list service, `text=URL` for a plain-text one.
fn parse_upload_targets(raw: &str) -> Vec<UploadTarget> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            UploadTarget::parse(entry).unwrap_or_else(|| {
                panic!("UPLOAD_URLS entry '{}' is not an http(s) url", entry.trim())
            })
        })
        .collect()
}

/// Read `key` (or `default`) and parse it, panicking with the key name on
/// malformed input.
fn env_parse<T>(key: &str, default: &str) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .unwrap_or_else(|e| panic!("{key} must be a valid {}: {e}", std::any::type_name::<T>()))
}
