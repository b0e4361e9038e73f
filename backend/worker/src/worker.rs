use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use docproc_core::{
    BlobStore, Component, DocError, DocResult, DocumentText, JobOutcome, Message, OcrJob,
    TextExtractor, TextPolicy,
};
use docproc_storage::MetadataStore;

/// Default number of OCR jobs processed at once.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// The OCR worker pool. Consumes `RunOcr` messages from the job queue,
/// extracts text and writes it back, reporting progress to the tracker.
#[derive(Clone)]
pub struct OcrWorker {
    store: Arc<MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    tracker_tx: mpsc::Sender<Message>,
    policy: TextPolicy,
    concurrency: usize,
}

impl OcrWorker {
    pub fn new(
        store: Arc<MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        tracker_tx: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            store,
            blobs,
            extractor,
            tracker_tx,
            policy: TextPolicy::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_policy(mut self, policy: TextPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run one job to completion and report its outcome. Never fails:
    /// every error ends up in the returned outcome.
    pub async fn process(&self, job: OcrJob) -> JobOutcome {
        self.report(Message::JobStarted {
            job_id: job.job_id.clone(),
            document_id: job.document_id,
        })
        .await;

        // Run on a separate task so a panicking OCR engine still yields an outcome.
        let worker = self.clone();
        let task_job = job.clone();
        let result = tokio::spawn(async move { worker.execute(&task_job).await }).await;

        let outcome = match result {
            Ok(Ok(text)) => {
                let chars = text.text.chars().count();
                info!(job_id = %job.job_id, document_id = job.document_id, chars, "OCR job succeeded");
                JobOutcome::success(&job, format!("{chars} characters extracted"))
            }
            Ok(Err(DocError::NotFound(_))) => {
                warn!(
                    job_id = %job.job_id,
                    document_id = job.document_id,
                    "Document deleted before OCR finished, text discarded"
                );
                JobOutcome::failure(&job, "document no longer exists; text discarded")
            }
            Ok(Err(e)) => {
                warn!(job_id = %job.job_id, document_id = job.document_id, error = %e, "OCR job failed");
                JobOutcome::failure(&job, e.to_string())
            }
            Err(join_err) => {
                error!(job_id = %job.job_id, error = %join_err, "OCR task aborted");
                JobOutcome::failure(&job, format!("worker task aborted: {join_err}"))
            }
        };

        self.report(Message::JobFinished(outcome.clone())).await;
        outcome
    }

    async fn execute(&self, job: &OcrJob) -> DocResult<DocumentText> {
        if self.store.get_document(job.document_id).await?.is_none() {
            return Err(DocError::document_not_found(job.document_id));
        }

        let image = self.blobs.read(&job.locator).await?;
        let format = image::guess_format(&image)
            .map_err(|_| DocError::OcrFailure("unreadable image: unrecognised format".into()))?;
        debug!(job_id = %job.job_id, format = ?format, engine = self.extractor.name(), "Extracting text");

        let text = self.extractor.extract(&image).await?;

        // Rejected with NotFound if the document was deleted while OCR ran.
        self.store.write_text(job.document_id, &text, self.policy).await
    }

    async fn report(&self, msg: Message) {
        if let Err(e) = self.tracker_tx.send(msg).await {
            warn!(error = %e, "Job tracker unavailable, outcome not recorded");
        }
    }
}

#[async_trait]
impl Component for OcrWorker {
    fn name(&self) -> &str {
        "ocr-worker"
    }

    async fn start(&self, mut rx: mpsc::Receiver<Message>) -> Result<()> {
        info!(
            concurrency = self.concurrency,
            engine = self.extractor.name(),
            policy = ?self.policy,
            "OCR worker started"
        );

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight = JoinSet::new();

        while let Some(msg) = rx.recv().await {
            match msg {
                Message::RunOcr(job) => {
                    let permit = Arc::clone(&permits).acquire_owned().await?;
                    let worker = self.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        worker.process(job).await
                    });
                }
                other => {
                    debug!(msg_type = ?other, "OCR worker ignoring non-job message");
                }
            }

            // Reap finished jobs so the set does not grow unbounded.
            while in_flight.try_join_next().is_some() {}
        }

        info!(remaining = in_flight.len(), "Job queue closed, draining in-flight jobs");
        while in_flight.join_next().await.is_some() {}
        info!("OCR worker shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::StaticExtractor;
    use chrono::NaiveDate;
    use docproc_core::{DocumentId, JobStatus};
    use docproc_storage::FsBlobStore;
    use std::time::Duration;
    use tokio::sync::Notify;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<MetadataStore>,
        blobs: Arc<FsBlobStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        Fixture {
            store: Arc::new(MetadataStore::in_memory().unwrap()),
            blobs: Arc::new(FsBlobStore::new(dir.path().join("documents"))),
            _dir: dir,
        }
    }

    async fn upload(f: &Fixture, bytes: &[u8]) -> (DocumentId, String) {
        let locator = f.blobs.put(bytes, "png").await.unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let doc = f.store.insert_document(&locator, date).await.unwrap();
        (doc.id, locator)
    }

    fn job(id: &str, document_id: DocumentId, locator: &str) -> OcrJob {
        OcrJob {
            job_id: id.into(),
            document_id,
            locator: locator.into(),
        }
    }

    fn worker(f: &Fixture, extractor: Arc<dyn TextExtractor>) -> (OcrWorker, mpsc::Receiver<Message>) {
        let (tracker_tx, tracker_rx) = mpsc::channel(16);
        let worker = OcrWorker::new(f.store.clone(), f.blobs.clone(), extractor, tracker_tx);
        (worker, tracker_rx)
    }

    #[tokio::test]
    async fn test_process_writes_text_and_reports() {
        let f = fixture();
        let (id, locator) = upload(&f, PNG_MAGIC).await;
        let (worker, mut tracker_rx) = worker(&f, Arc::new(StaticExtractor::new("Hello scan")));

        let outcome = worker.process(job("j1", id, &locator)).await;
        assert_eq!(outcome.status, JobStatus::Success);
        assert_eq!(f.store.latest_text(id).await.unwrap().unwrap().text, "Hello scan");

        assert!(matches!(tracker_rx.recv().await, Some(Message::JobStarted { .. })));
        assert!(matches!(tracker_rx.recv().await, Some(Message::JobFinished(_))));
    }

    #[tokio::test]
    async fn test_unreadable_image_leaves_no_text() {
        let f = fixture();
        let (id, locator) = upload(&f, b"definitely not an image").await;
        let (worker, _rx) = worker(&f, Arc::new(StaticExtractor::new("never used")));

        let outcome = worker.process(job("j1", id, &locator)).await;
        assert_eq!(outcome.status, JobStatus::Error);
        assert!(outcome.error.unwrap().contains("unreadable image"));
        assert!(f.store.latest_text(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ocr_failure_is_reported() {
        let f = fixture();
        let (id, locator) = upload(&f, PNG_MAGIC).await;
        let (worker, _rx) = worker(&f, Arc::new(StaticExtractor::failing("engine crashed")));

        let outcome = worker.process(job("j1", id, &locator)).await;
        assert_eq!(outcome.status, JobStatus::Error);
        assert!(outcome.error.unwrap().contains("engine crashed"));
        assert_eq!(f.store.text_count(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rerun_replaces_text() {
        let f = fixture();
        let (id, locator) = upload(&f, PNG_MAGIC).await;

        let (first, _rx1) = worker(&f, Arc::new(StaticExtractor::new("old")));
        first.process(job("j1", id, &locator)).await;
        let (second, _rx2) = worker(&f, Arc::new(StaticExtractor::new("new")));
        second.process(job("j2", id, &locator)).await;

        assert_eq!(f.store.text_count(id).await.unwrap(), 1);
        assert_eq!(f.store.latest_text(id).await.unwrap().unwrap().text, "new");
    }

    #[tokio::test]
    async fn test_append_history_policy_keeps_rows() {
        let f = fixture();
        let (id, locator) = upload(&f, PNG_MAGIC).await;
        let (worker, _rx) = worker(&f, Arc::new(StaticExtractor::new("same")));
        let worker = worker.with_policy(TextPolicy::AppendHistory);

        worker.process(job("j1", id, &locator)).await;
        worker.process(job("j2", id, &locator)).await;
        assert_eq!(f.store.text_count(id).await.unwrap(), 2);
    }

    /// Blocks inside `extract` until released, to simulate a slow OCR run.
    struct GatedExtractor {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl TextExtractor for GatedExtractor {
        fn name(&self) -> &str {
            "gated"
        }

        async fn extract(&self, _image: &[u8]) -> DocResult<String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("late text".into())
        }
    }

    #[tokio::test]
    async fn test_delete_during_processing_drops_write() {
        let f = fixture();
        let (id, locator) = upload(&f, PNG_MAGIC).await;
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let extractor = Arc::new(GatedExtractor {
            entered: entered.clone(),
            release: release.clone(),
        });
        let (worker, _rx) = worker(&f, extractor);

        let handle = tokio::spawn({
            let worker = worker.clone();
            let job = job("j1", id, &locator);
            async move { worker.process(job).await }
        });

        entered.notified().await;
        assert!(f.store.delete_document(id).await.unwrap());
        release.notify_one();

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, JobStatus::Error);
        assert!(f.store.get_document(id).await.unwrap().is_none());
        assert_eq!(f.store.text_count(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_start_drains_queue_then_stops() {
        let f = fixture();
        let (id, locator) = upload(&f, PNG_MAGIC).await;
        let (worker, mut tracker_rx) = worker(&f, Arc::new(StaticExtractor::new("pool text")));
        let worker = worker.with_concurrency(4);

        let (queue_tx, queue_rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move { worker.start(queue_rx).await });

        for i in 0..3 {
            queue_tx
                .send(Message::RunOcr(job(&format!("j{i}"), id, &locator)))
                .await
                .unwrap();
        }
        drop(queue_tx);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let mut finished = 0;
        while let Ok(msg) = tracker_rx.try_recv() {
            if matches!(msg, Message::JobFinished(_)) {
                finished += 1;
            }
        }
        assert_eq!(finished, 3);
        assert_eq!(f.store.text_count(id).await.unwrap(), 1);
    }
}
