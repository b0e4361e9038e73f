use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use docproc_core::{Component, JobOutcome, JobStatus, Message};
use docproc_storage::MetadataStore;

/// Capacity of the outcome broadcast channel.
const OUTCOME_BUFFER: usize = 100;

/// The Job Tracker consumes worker reports, persists job status so it can be
/// queried, and re-broadcasts final outcomes to in-process subscribers.
pub struct JobTracker {
    store: Arc<MetadataStore>,
    outcome_tx: broadcast::Sender<JobOutcome>,
}

impl JobTracker {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        let (outcome_tx, _) = broadcast::channel(OUTCOME_BUFFER);
        Self { store, outcome_tx }
    }

    /// Subscribe to job outcomes recorded from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobOutcome> {
        self.outcome_tx.subscribe()
    }

    async fn record_started(&self, job_id: &str, document_id: i64) {
        match self
            .store
            .update_job_status(job_id, JobStatus::Running, None, None)
            .await
        {
            Ok(true) => debug!(job_id = %job_id, document_id, "Job running"),
            Ok(false) => warn!(job_id = %job_id, "Start reported for unknown or finished job"),
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to persist job start"),
        }
    }

    async fn record_finished(&self, outcome: JobOutcome) {
        if let Err(e) = self
            .store
            .update_job_status(
                &outcome.job_id,
                outcome.status,
                outcome.result.as_deref(),
                outcome.error.as_deref(),
            )
            .await
        {
            error!(job_id = %outcome.job_id, error = %e, "Failed to persist job outcome");
        }

        match outcome.status {
            JobStatus::Success => {
                info!(job_id = %outcome.job_id, document_id = outcome.document_id, "Job completed");
            }
            _ => {
                warn!(
                    job_id = %outcome.job_id,
                    document_id = outcome.document_id,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "Job failed"
                );
            }
        }

        // No subscribers is fine
        let _ = self.outcome_tx.send(outcome);
    }
}

#[async_trait]
impl Component for JobTracker {
    fn name(&self) -> &str {
        "job-tracker"
    }

    async fn start(&self, mut rx: mpsc::Receiver<Message>) -> Result<()> {
        info!("Job tracker started");

        while let Some(msg) = rx.recv().await {
            match msg {
                Message::JobStarted { job_id, document_id } => {
                    self.record_started(&job_id, document_id).await;
                }
                Message::JobFinished(outcome) => {
                    self.record_finished(outcome).await;
                }
                other => {
                    debug!(msg_type = ?other, "Tracker ignoring non-report message");
                }
            }
        }

        info!("Tracker channel closed, shutting down");
        Ok(())
    }
}
