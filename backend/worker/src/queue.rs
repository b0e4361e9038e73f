use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};
use uuid::Uuid;

use docproc_core::{
    BlobStore, DocError, DocResult, DocumentId, JobRecord, JobStatus, Message, OcrJob,
};
use docproc_storage::MetadataStore;

/// Enqueue side of the OCR job queue.
///
/// `enqueue` never runs OCR itself: it validates the request, records a
/// `pending` job and hands it to the worker pool without waiting.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    queue_tx: mpsc::Sender<Message>,
}

impl JobQueue {
    pub fn new(
        store: Arc<MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        queue_tx: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            store,
            blobs,
            queue_tx,
        }
    }

    /// Submit an OCR job for a document and return its job id.
    pub async fn enqueue(&self, document_id: DocumentId) -> DocResult<String> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| DocError::document_not_found(document_id))?;

        if !self.blobs.exists(&document.locator).await? {
            // A concurrent delete removes the blob before the row.
            if self.store.get_document(document_id).await?.is_none() {
                return Err(DocError::document_not_found(document_id));
            }
            return Err(DocError::StorageError(format!(
                "stored image for document {document_id} is missing"
            )));
        }

        if self.queue_tx.is_closed() {
            error!(document_id, "Job queue closed, analysis not started");
            return Err(DocError::QueueUnavailable("worker pool is not running".into()));
        }

        let job_id = Uuid::new_v4().to_string();
        self.store
            .insert_job(&JobRecord::pending(&job_id, document_id, &document.locator))
            .await?;

        let job = OcrJob {
            job_id: job_id.clone(),
            document_id,
            locator: document.locator,
        };

        let reason = match self.queue_tx.try_send(Message::RunOcr(job)) {
            Ok(()) => {
                info!(job_id = %job_id, document_id, "OCR job enqueued");
                return Ok(job_id);
            }
            Err(TrySendError::Full(_)) => "job queue is full",
            Err(TrySendError::Closed(_)) => "worker pool is not running",
        };

        warn!(job_id = %job_id, document_id, reason, "Failed to enqueue OCR job");
        if let Err(e) = self
            .store
            .update_job_status(&job_id, JobStatus::Error, None, Some(reason))
            .await
        {
            error!(job_id = %job_id, error = %e, "Failed to mark rejected job");
        }
        Err(DocError::QueueUnavailable(reason.to_string()))
    }
}
