use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};

use docproc_core::{DocError, DocResult, DocumentId};

use crate::error::ApiResult;
use crate::service::{DocumentService, Upload};

/// Multipart field the upload is read from.
const UPLOAD_FIELD: &str = "file";

/// Shared application state for API handlers.
pub struct AppState {
    pub service: DocumentService,
}

/// Build the Axum router with all API routes.
pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload_doc", post(upload_doc))
        .route("/doc_delete/:id", delete(delete_doc))
        .route("/doc_analyse/:id", post(analyse_doc))
        .route("/get_text/:id", get(get_text))
        .route("/jobs/:job_id", get(get_job))
        .route("/documents/:id/jobs", get(list_document_jobs))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "docproc",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Store an uploaded scan and register it.
async fn upload_doc(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let upload = read_upload(&mut multipart).await?;
    let doc = state.service.upload(upload).await?;
    Ok(Json(json!({
        "id": doc.id,
        "locator": doc.locator,
        "date": doc.created_date,
    })))
}

/// Take the `file` field, or failing that the first part that carries a file name.
async fn read_upload(multipart: &mut Multipart) -> DocResult<Upload> {
    let mut fallback = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DocError::InvalidRequest(format!("invalid multipart body: {e}")))?
    {
        let named = field.name() == Some(UPLOAD_FIELD);
        if !named && (fallback.is_some() || field.file_name().is_none()) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| DocError::InvalidRequest(format!("failed to read upload: {e}")))?
            .to_vec();

        let upload = Upload {
            file_name,
            content_type,
            data,
        };
        if named {
            return Ok(upload);
        }
        fallback = Some(upload);
    }

    fallback.ok_or_else(|| {
        DocError::InvalidRequest(format!("multipart field '{UPLOAD_FIELD}' is required"))
    })
}

async fn delete_doc(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DocumentId>,
) -> ApiResult<Json<Value>> {
    state.service.delete(id).await?;
    Ok(Json(json!({ "message": "Document deleted successfully" })))
}

/// Queue OCR for a document. Returns as soon as the job is handed off.
async fn analyse_doc(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DocumentId>,
) -> ApiResult<Json<Value>> {
    let job_id = state.service.trigger_analysis(id).await?;
    Ok(Json(json!({
        "message": "Analysis started",
        "job_id": job_id,
    })))
}

async fn get_text(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DocumentId>,
) -> ApiResult<Json<Value>> {
    let text = state.service.fetch_text(id).await?;
    Ok(Json(json!({
        "document_id": text.document_id,
        "text": text.text,
    })))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let job = state.service.job(&job_id).await?;
    Ok(Json(json!(job)))
}

async fn list_document_jobs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DocumentId>,
) -> ApiResult<Json<Value>> {
    let jobs = state.service.document_jobs(id).await?;
    Ok(Json(json!({ "document_id": id, "jobs": jobs })))
}
