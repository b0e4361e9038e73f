//! Filesystem blob store.
//!
//! Every upload is written once under `<root>/<uuid>.<ext>` and removed at most
//! once when its document is deleted. The locator handed out is the file path.

use std::path::{Component as PathComponent, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use docproc_core::{BlobStore, DocError, DocResult};

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if needed. Called once at startup.
    pub async fn ensure_root(&self) -> DocResult<()> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            DocError::StorageError(format!("create_dir_all({}): {e}", self.root.display()))
        })?;
        info!(root = %self.root.display(), "Blob store ready");
        Ok(())
    }

    /// Map a locator back to a path, refusing anything outside the root.
    fn resolve(&self, locator: &str) -> DocResult<PathBuf> {
        let path = PathBuf::from(locator);
        let escapes = path
            .components()
            .any(|c| matches!(c, PathComponent::ParentDir));
        if escapes || !path.starts_with(&self.root) {
            warn!(locator = %locator, "Rejected locator outside blob root");
            return Err(DocError::StorageError(format!(
                "locator '{locator}' is outside the blob store"
            )));
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, data: &[u8], extension: &str) -> DocResult<String> {
        self.ensure_root().await?;

        let name = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.root.join(&name);
        let tmp = self.root.join(format!(".{name}.tmp"));

        // Write to a temp file first so a crash never leaves a truncated blob.
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| DocError::StorageError(format!("create({}): {e}", tmp.display())))?;
        file.write_all(data)
            .await
            .map_err(|e| DocError::StorageError(format!("write({}): {e}", tmp.display())))?;
        file.sync_all()
            .await
            .map_err(|e| DocError::StorageError(format!("sync({}): {e}", tmp.display())))?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(DocError::StorageError(format!("rename({}): {e}", path.display())));
        }

        debug!(path = %path.display(), size = data.len(), "Blob written");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn read(&self, locator: &str) -> DocResult<Vec<u8>> {
        let path = self.resolve(locator)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DocError::StorageError(
                format!("blob '{locator}' does not exist"),
            )),
            Err(e) => Err(DocError::StorageError(format!("read({}): {e}", path.display()))),
        }
    }

    async fn delete(&self, locator: &str) -> DocResult<bool> {
        let path = self.resolve(locator)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Blob deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Blob already gone");
                Ok(false)
            }
            Err(e) => Err(DocError::StorageError(format!("remove_file({}): {e}", path.display()))),
        }
    }

    async fn exists(&self, locator: &str) -> DocResult<bool> {
        let path = self.resolve(locator)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| DocError::StorageError(format!("stat({}): {e}", path.display())))
    }
}
