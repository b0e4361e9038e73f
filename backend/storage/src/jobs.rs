//! Job status table.
//!
//! Jobs keep their row after the document is deleted, so a client can still
//! learn why a job ended in `error`.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use docproc_core::{DocError, DocResult, DocumentId, JobRecord, JobStatus};

use crate::metadata::{db_err, MetadataStore};

const JOB_COLUMNS: &str =
    "job_id, document_id, locator, status, result, error, created_at, updated_at";

fn row_to_job(row: &Row) -> rusqlite::Result<JobRecord> {
    let status: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    let status = status
        .parse::<JobStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;

    Ok(JobRecord {
        job_id: row.get(0)?,
        document_id: row.get(1)?,
        locator: row.get(2)?,
        status,
        result: row.get(4)?,
        error: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
        updated_at: parse_timestamp(7, &updated_at)?,
    })
}

/// Fixed-width so timestamps sort lexically.
fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl MetadataStore {
    /// Record a newly enqueued job.
    pub async fn insert_job(&self, job: &JobRecord) -> DocResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO jobs (job_id, document_id, locator, status, result, error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.job_id,
                job.document_id,
                job.locator,
                job.status.as_str(),
                job.result,
                job.error,
                format_timestamp(&job.created_at),
                format_timestamp(&job.updated_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Move a job to a new status. Jobs already in a final state are left untouched.
    ///
    /// Returns `false` if no open job with that id exists.
    pub async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<&str>,
        error: Option<&str>,
    ) -> DocResult<bool> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE jobs SET status = ?2, result = ?3, error = ?4, updated_at = ?5
                 WHERE job_id = ?1 AND status IN ('pending', 'running')",
                params![
                    job_id,
                    status.as_str(),
                    result,
                    error,
                    format_timestamp(&Utc::now()),
                ],
            )
            .map_err(db_err)?;
        debug!(job_id = %job_id, status = %status, changed, "Job status updated");
        Ok(changed > 0)
    }

    pub async fn get_job(&self, job_id: &str) -> DocResult<Option<JobRecord>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?1"),
            params![job_id],
            row_to_job,
        )
        .optional()
        .map_err(db_err)
    }

    /// All jobs for a document, newest first.
    pub async fn jobs_for_document(&self, document_id: DocumentId) -> DocResult<Vec<JobRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs WHERE document_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ))
            .map_err(db_err)?;
        let jobs = stmt
            .query_map(params![document_id], row_to_job)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DocError::Database(format!("failed to read jobs: {e}")))?;
        Ok(jobs)
    }
}
