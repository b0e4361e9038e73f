use serde::{Deserialize, Serialize};

use crate::types::{DocumentId, JobStatus};

/// Messages exchanged between components via the DocBus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Queue → Worker: run OCR for this document
    RunOcr(OcrJob),
    /// Worker → Tracker: a job was picked up
    JobStarted { job_id: String, document_id: DocumentId },
    /// Worker → Tracker: a job reached a final state
    JobFinished(JobOutcome),
}

/// A unit of OCR work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrJob {
    pub job_id: String,
    pub document_id: DocumentId,
    pub locator: String,
}

/// Final result of a job, as reported on the result channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub document_id: DocumentId,
    pub status: JobStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn success(job: &OcrJob, result: impl Into<String>) -> Self {
        Self {
            job_id: job.job_id.clone(),
            document_id: job.document_id,
            status: JobStatus::Success,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failure(job: &OcrJob, error: impl Into<String>) -> Self {
        Self {
            job_id: job.job_id.clone(),
            document_id: job.document_id,
            status: JobStatus::Error,
            result: None,
            error: Some(error.into()),
        }
    }
}

impl Message {
    pub fn job_id(&self) -> &str {
        match self {
            Message::RunOcr(job) => &job.job_id,
            Message::JobStarted { job_id, .. } => job_id,
            Message::JobFinished(outcome) => &outcome.job_id,
        }
    }
}
