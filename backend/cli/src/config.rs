use std::path::PathBuf;

use serde::Deserialize;

use docproc_core::TextPolicy;

/// Document processor runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server bind address
    pub bind_address: String,
    /// HTTP server port
    pub port: u16,
    /// SQLite database path
    pub db_path: String,
    /// Directory uploaded scans are stored in
    pub blob_dir: PathBuf,
    /// Directory for rolling JSON log files (console only when unset)
    pub log_dir: Option<PathBuf>,
    /// Log level
    pub log_level: String,

    // OCR worker pool
    pub worker_concurrency: usize,
    pub queue_capacity: usize,
    pub tesseract_bin: String,
    pub ocr_lang: String,
    pub text_policy: TextPolicy,

    /// Largest accepted upload body, in bytes
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            db_path: "docproc.db".to_string(),
            blob_dir: PathBuf::from("documents"),
            log_dir: None,
            log_level: "info".to_string(),
            worker_concurrency: 2,
            queue_capacity: 256,
            tesseract_bin: "tesseract".to_string(),
            ocr_lang: "eng".to_string(),
            text_policy: TextPolicy::ReplaceLatest,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unparseable values fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_address: get("DOCPROC_BIND").unwrap_or(defaults.bind_address),
            port: get("DOCPROC_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            db_path: get("DOCPROC_DB").unwrap_or(defaults.db_path),
            blob_dir: get("DOCPROC_BLOB_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.blob_dir),
            log_dir: get("DOCPROC_LOG_DIR")
                .filter(|d| !d.is_empty())
                .map(PathBuf::from),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            worker_concurrency: get("DOCPROC_WORKERS")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.worker_concurrency),
            queue_capacity: get("DOCPROC_QUEUE_CAPACITY")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.queue_capacity),
            tesseract_bin: get("DOCPROC_TESSERACT").unwrap_or(defaults.tesseract_bin),
            ocr_lang: get("DOCPROC_OCR_LANG").unwrap_or(defaults.ocr_lang),
            text_policy: get("DOCPROC_TEXT_POLICY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.text_policy),
            max_upload_bytes: get("DOCPROC_MAX_UPLOAD_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
        }
    }
}
