use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::DocResult;
use crate::message::Message;

/// Trait for long-running components (OCR worker, job tracker).
///
/// Each component receives messages from its channel and runs in its own Tokio task.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Human-readable name of this component.
    fn name(&self) -> &str;

    /// Start the component's event loop, consuming from the given receiver.
    async fn start(&self, rx: mpsc::Receiver<Message>) -> Result<()>;
}

/// The external OCR capability: image bytes in, text out.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Engine name, used in logs.
    fn name(&self) -> &str;

    /// Extract text from an encoded image.
    async fn extract(&self, image: &[u8]) -> DocResult<String>;
}

/// Durable storage for uploaded bytes, addressed by locator.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a freshly generated name and return its locator.
    async fn put(&self, data: &[u8], extension: &str) -> DocResult<String>;

    /// Read the bytes behind a locator.
    async fn read(&self, locator: &str) -> DocResult<Vec<u8>>;

    /// Remove a blob. Returns `false` if it was already gone.
    async fn delete(&self, locator: &str) -> DocResult<bool>;

    /// Check if a blob exists.
    async fn exists(&self, locator: &str) -> DocResult<bool>;
}
