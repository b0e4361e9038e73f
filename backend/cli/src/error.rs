use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::{error, warn};

use docproc_core::DocError;

/// A `DocError` leaving through the HTTP boundary.
#[derive(Debug)]
pub struct ApiError(pub DocError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DocError::NotFound(_) => StatusCode::NOT_FOUND,
            DocError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DocError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DocError::StorageError(_)
            | DocError::OcrFailure(_)
            | DocError::Database(_)
            | DocError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl<E: Into<DocError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "Request failed");
        } else {
            warn!(kind = self.0.kind(), error = %self.0, "Request rejected");
        }
        let body = json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
