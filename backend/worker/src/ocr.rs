//! OCR engines.
//!
//! The OCR routine is an external capability; `TesseractExtractor` reaches it
//! through the `tesseract` command-line tool.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use docproc_core::{DocError, DocResult, TextExtractor};

/// Runs `tesseract stdin stdout -l <lang>` with the image piped to stdin.
pub struct TesseractExtractor {
    binary: String,
    lang: String,
}

impl TesseractExtractor {
    pub fn new(binary: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            lang: lang.into(),
        }
    }
}

impl Default for TesseractExtractor {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn extract(&self, image: &[u8]) -> DocResult<String> {
        info!(binary = %self.binary, lang = %self.lang, bytes = image.len(), "Running OCR");

        let mut child = Command::new(&self.binary)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DocError::OcrFailure(format!("failed to start '{}': {e}", self.binary)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DocError::OcrFailure("tesseract stdin unavailable".into()))?;

        // Feed stdin concurrently so a full stdout pipe cannot stall us.
        let data = image.to_vec();
        let writer = tokio::spawn(async move {
            stdin.write_all(&data).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DocError::OcrFailure(format!("tesseract did not finish: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DocError::OcrFailure(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        // A broken pipe after a successful exit is harmless.
        if let Ok(Err(e)) = writer.await {
            debug!(error = %e, "tesseract closed stdin early");
        }

        let text = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        debug!(chars = text.chars().count(), "OCR finished");
        Ok(text)
    }
}

/// Returns canned text (or a canned failure) for every image.
#[cfg(any(test, feature = "test-util"))]
pub struct StaticExtractor {
    outcome: Result<String, String>,
}

#[cfg(any(test, feature = "test-util"))]
impl StaticExtractor {
    pub fn new(text: impl Into<String>) -> Self {
        Self { outcome: Ok(text.into()) }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { outcome: Err(message.into()) }
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl TextExtractor for StaticExtractor {
    fn name(&self) -> &str {
        "static"
    }

    async fn extract(&self, _image: &[u8]) -> DocResult<String> {
        self.outcome.clone().map_err(DocError::OcrFailure)
    }
}
