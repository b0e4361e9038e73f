use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use docproc_core::{
    BlobStore, DocError, DocResult, Document, DocumentId, DocumentText, JobRecord,
};
use docproc_storage::{extension_for, is_image, MetadataStore};
use docproc_worker::JobQueue;

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Request orchestration for the document endpoints.
///
/// Owns handles to the stores and the job queue; every call is independent.
#[derive(Clone)]
pub struct DocumentService {
    store: Arc<MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    queue: JobQueue,
}

impl DocumentService {
    pub fn new(store: Arc<MetadataStore>, blobs: Arc<dyn BlobStore>, queue: JobQueue) -> Self {
        Self { store, blobs, queue }
    }

    /// Store the bytes, then record the document with today's date.
    pub async fn upload(&self, upload: Upload) -> DocResult<Document> {
        if upload.data.is_empty() {
            return Err(DocError::InvalidRequest("uploaded file is empty".into()));
        }

        if let Some(ct) = upload.content_type.as_deref().filter(|ct| !is_image(ct)) {
            warn!(content_type = %ct, "Upload is not declared as an image, OCR may fail");
        }

        let ext = extension_for(upload.content_type.as_deref(), upload.file_name.as_deref());
        let locator = self.blobs.put(&upload.data, ext).await?;

        let today = Local::now().date_naive();
        match self.store.insert_document(&locator, today).await {
            Ok(doc) => {
                info!(document_id = doc.id, locator = %doc.locator, bytes = upload.data.len(), "Document uploaded");
                Ok(doc)
            }
            Err(e) => {
                // Do not leave an unreferenced blob behind.
                if let Err(cleanup) = self.blobs.delete(&locator).await {
                    warn!(locator = %locator, error = %cleanup, "Failed to remove orphaned blob");
                }
                Err(e)
            }
        }
    }

    /// Remove the blob (missing or unreachable is fine), then the text rows and the document row.
    pub async fn delete(&self, id: DocumentId) -> DocResult<()> {
        let doc = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| DocError::document_not_found(id))?;

        // Blob removal is best-effort; the rows go regardless.
        match self.blobs.delete(&doc.locator).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(document_id = id, locator = %doc.locator, "Blob already missing on delete");
            }
            Err(DocError::StorageError(reason)) => {
                warn!(document_id = id, locator = %doc.locator, reason = %reason, "Blob not removed on delete");
            }
            Err(e) => return Err(e),
        }

        if !self.store.delete_document(id).await? {
            return Err(DocError::document_not_found(id));
        }
        info!(document_id = id, "Document deleted");
        Ok(())
    }

    /// Hand the document to the OCR queue; returns the job id without waiting.
    pub async fn trigger_analysis(&self, id: DocumentId) -> DocResult<String> {
        self.queue.enqueue(id).await
    }

    /// The latest extracted text. `NotFound` covers both "not analysed yet" and "still running".
    pub async fn fetch_text(&self, id: DocumentId) -> DocResult<DocumentText> {
        self.store
            .latest_text(id)
            .await?
            .ok_or_else(|| DocError::NotFound(format!("text for document {id}")))
    }

    pub async fn job(&self, job_id: &str) -> DocResult<JobRecord> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| DocError::NotFound(format!("job {job_id}")))
    }

    pub async fn document_jobs(&self, id: DocumentId) -> DocResult<Vec<JobRecord>> {
        if self.store.get_document(id).await?.is_none() {
            return Err(DocError::document_not_found(id));
        }
        self.store.jobs_for_document(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docproc_core::{DocBus, Message, TextPolicy};
    use docproc_storage::FsBlobStore;
    use tempfile::TempDir;

    async fn service(dir: &TempDir) -> (DocumentService, Arc<MetadataStore>, DocBus) {
        let store = Arc::new(MetadataStore::in_memory().unwrap());
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(dir.path()));
        let bus = DocBus::with_buffer_size(4);
        let queue = JobQueue::new(store.clone(), blobs.clone(), bus.queue_tx.clone());
        (DocumentService::new(store.clone(), blobs, queue), store, bus)
    }

    fn png_upload() -> Upload {
        Upload {
            file_name: Some("scan.png".into()),
            content_type: None,
            data: b"\x89PNG\r\n\x1a\nbody".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_upload_uses_file_extension() {
        let dir = TempDir::new().unwrap();
        let (service, _, _bus) = service(&dir).await;
        let doc = service.upload(png_upload()).await.unwrap();
        assert!(doc.locator.ends_with(".png"));
        assert_eq!(doc.created_date, Local::now().date_naive());
    }

    #[tokio::test]
    async fn test_upload_rejects_empty() {
        let dir = TempDir::new().unwrap();
        let (service, _, _bus) = service(&dir).await;
        let err = service
            .upload(Upload { file_name: None, content_type: None, data: Vec::new() })
            .await
            .unwrap_err();
        assert!(matches!(err, DocError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_trigger_enqueues_job() {
        let dir = TempDir::new().unwrap();
        let (service, store, mut bus) = service(&dir).await;
        let doc = service.upload(png_upload()).await.unwrap();

        let job_id = service.trigger_analysis(doc.id).await.unwrap();
        let mut rx = bus.take_queue_rx().unwrap();
        match rx.recv().await.unwrap() {
            Message::RunOcr(job) => {
                assert_eq!(job.job_id, job_id);
                assert_eq!(job.document_id, doc.id);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(service.job(&job_id).await.unwrap().document_id, doc.id);
        assert_eq!(store.jobs_for_document(doc.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_text_returns_latest() {
        let dir = TempDir::new().unwrap();
        let (service, store, _bus) = service(&dir).await;
        let doc = service.upload(png_upload()).await.unwrap();

        assert!(matches!(service.fetch_text(doc.id).await, Err(DocError::NotFound(_))));
        store.write_text(doc.id, "first", TextPolicy::AppendHistory).await.unwrap();
        store.write_text(doc.id, "second", TextPolicy::AppendHistory).await.unwrap();
        assert_eq!(service.fetch_text(doc.id).await.unwrap().text, "second");
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_blob() {
        let dir = TempDir::new().unwrap();
        let (service, store, _bus) = service(&dir).await;
        let doc = service.upload(png_upload()).await.unwrap();
        std::fs::remove_file(&doc.locator).unwrap();

        service.delete(doc.id).await.unwrap();
        assert!(store.get_document(doc.id).await.unwrap().is_none());
        assert!(matches!(service.delete(doc.id).await, Err(DocError::NotFound(_))));
        assert!(matches!(service.document_jobs(doc.id).await, Err(DocError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_survives_moved_blob_root() {
        let old_root = TempDir::new().unwrap();
        let (old_service, _, _old_bus) = service(&old_root).await;
        let doc = old_service.upload(png_upload()).await.unwrap();

        // Same database, blob directory reconfigured since the upload.
        let new_root = TempDir::new().unwrap();
        let store = Arc::new(MetadataStore::in_memory().unwrap());
        let moved = store.insert_document(&doc.locator, doc.created_date).await.unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(new_root.path()));
        let bus = DocBus::with_buffer_size(4);
        let queue = JobQueue::new(store.clone(), blobs.clone(), bus.queue_tx.clone());
        let service = DocumentService::new(store.clone(), blobs, queue);

        service.delete(moved.id).await.unwrap();
        assert!(store.get_document(moved.id).await.unwrap().is_none());
        assert!(std::path::Path::new(&doc.locator).exists());
    }
}
