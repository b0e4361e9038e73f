use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::task::JoinHandle;
use tracing::{error, info};

use docproc_core::{BlobStore, Component, DocBus, TextExtractor};
use docproc_storage::MetadataStore;
use docproc_worker::{JobQueue, JobTracker, OcrWorker};

use crate::api::AppState;
use crate::config::Config;
use crate::service::DocumentService;

/// The running background components plus the state handed to the API.
pub struct Runtime {
    pub state: Arc<AppState>,
    pub tracker: Arc<JobTracker>,
    worker_task: JoinHandle<()>,
    tracker_task: JoinHandle<()>,
}

impl Runtime {
    /// Wire the job queue, worker pool and tracker, and spawn their tasks.
    pub fn start(
        config: &Config,
        store: Arc<MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self> {
        let mut bus = DocBus::with_buffer_size(config.queue_capacity);
        let queue_rx = bus
            .take_queue_rx()
            .ok_or_else(|| anyhow!("queue receiver already taken"))?;
        let tracker_rx = bus
            .take_tracker_rx()
            .ok_or_else(|| anyhow!("tracker receiver already taken"))?;

        let tracker = Arc::new(JobTracker::new(Arc::clone(&store)));
        let worker = OcrWorker::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            extractor,
            bus.tracker_tx.clone(),
        )
        .with_policy(config.text_policy)
        .with_concurrency(config.worker_concurrency);

        let tracker_ref = Arc::clone(&tracker);
        let tracker_task = tokio::spawn(async move {
            if let Err(e) = tracker_ref.start(tracker_rx).await {
                error!(error = %e, "Job tracker task failed");
            }
        });

        let worker_task = tokio::spawn(async move {
            if let Err(e) = worker.start(queue_rx).await {
                error!(error = %e, "OCR worker task failed");
            }
        });

        let queue = JobQueue::new(Arc::clone(&store), Arc::clone(&blobs), bus.queue_tx.clone());
        let state = Arc::new(AppState {
            service: DocumentService::new(store, blobs, queue),
        });

        info!(
            workers = config.worker_concurrency,
            queue_capacity = config.queue_capacity,
            "Background components started"
        );

        Ok(Self {
            state,
            tracker,
            worker_task,
            tracker_task,
        })
    }

    /// Close the job queue, let in-flight jobs finish, and stop the tracker.
    ///
    /// Any router built from `state` must be dropped first, or the queue stays open.
    pub async fn shutdown(self) {
        drop(self.state);
        if let Err(e) = self.worker_task.await {
            error!(error = %e, "OCR worker task panicked");
        }
        if let Err(e) = self.tracker_task.await {
            error!(error = %e, "Job tracker task panicked");
        }
        info!("Background components stopped");
    }
}
