use thiserror::Error;

/// Error kinds surfaced by the document processor.
#[derive(Debug, Error)]
pub enum DocError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("job queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("OCR failed: {0}")]
    OcrFailure(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DocError {
    pub fn document_not_found(id: i64) -> Self {
        DocError::NotFound(format!("document {id}"))
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DocError::NotFound(_) => "not_found",
            DocError::StorageError(_) => "storage_error",
            DocError::QueueUnavailable(_) => "queue_unavailable",
            DocError::OcrFailure(_) => "ocr_failure",
            DocError::Database(_) => "database_error",
            DocError::InvalidRequest(_) => "invalid_request",
            DocError::Other(_) => "internal_error",
        }
    }
}

impl From<std::io::Error> for DocError {
    fn from(e: std::io::Error) -> Self {
        DocError::StorageError(e.to_string())
    }
}

pub type DocResult<T> = Result<T, DocError>;
