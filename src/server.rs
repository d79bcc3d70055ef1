//! HTTP ingestion server.
//!
//! Accepts document uploads over multipart form data and answers semantic
//! queries against the stored chunks.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/upload_document` | Ingest a `.pdf`, `.docx`, or `.pptx` upload (field `file`) |
//! | `POST` | `/upload_pdf` | Ingest a PDF upload (field `file`) |
//! | `POST` | `/query` | `{ "text": "...", "top_k": 5 }` → closest chunks |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_text_found", "message": "No text could be extracted from 'scan.pdf'" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unsupported_format` (400),
//! `no_text_found` (422), `embedding_failed` (500), `storage_failed` (500),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser and mobile
//! clients on any host can upload.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::IngestError;
use crate::ingest::ingest_bytes;
use crate::models::{Document, DocumentFormat, IngestReport, QueryMatch};
use crate::services::Services;
use crate::store::query_similar;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    services: Arc<Services>,
}

/// Build the router over initialized services.
pub fn router(services: Arc<Services>) -> Router {
    let max_upload = services.config.server.max_upload_bytes;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/upload_document", post(handle_upload_document))
        .route("/upload_pdf", post(handle_upload_pdf))
        .route("/query", post(handle_query))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { services })
}

/// Serve until Ctrl-C, then close the store.
///
/// Binds to `[server].bind`. The services are shut down after the last
/// in-flight request completes.
pub async fn run_server(services: Services) -> anyhow::Result<()> {
    let bind_addr = services.config.server.bind.clone();
    let services = Arc::new(services);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "ingestion server listening");

    axum::serve(listener, router(services.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let status = match &err {
            IngestError::UnsupportedFormat { .. } => StatusCode::BAD_REQUEST,
            IngestError::NothingExtractable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Uploads ============

#[derive(Serialize)]
struct UploadResponse {
    status: String,
    document_id: String,
    filename: String,
    chunks_stored: usize,
}

impl From<IngestReport> for UploadResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            status: "success".to_string(),
            document_id: report.document_id,
            filename: report.filename,
            chunks_stored: report.chunks_stored,
        }
    }
}

/// The `file` part of a multipart upload.
struct Upload {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
        return Ok(Upload {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Err(bad_request("multipart field 'file' is required"))
}

/// `POST /upload_document`: format detected from the file extension.
async fn handle_upload_document(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let upload = read_upload(multipart).await?;
    let document = Document::accept(&upload.filename)?;
    info!(
        filename = %upload.filename,
        content_type = upload.content_type.as_deref().unwrap_or("-"),
        bytes = upload.bytes.len(),
        "document received"
    );

    let report = ingest_bytes(&state.services, &upload.bytes, document).await?;
    Ok(Json(report.into()))
}

/// `POST /upload_pdf`: accepts a PDF content type, or any upload named `*.pdf`.
async fn handle_upload_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let upload = read_upload(multipart).await?;
    if !is_pdf_upload(&upload.filename, upload.content_type.as_deref()) {
        return Err(bad_request(
            "Only PDF files are accepted. Please upload a .pdf file.",
        ));
    }
    info!(filename = %upload.filename, bytes = upload.bytes.len(), "PDF received");

    let document = Document::new(&upload.filename, DocumentFormat::Pdf);
    let report = ingest_bytes(&state.services, &upload.bytes, document).await?;
    Ok(Json(report.into()))
}

fn is_pdf_upload(filename: &str, content_type: Option<&str>) -> bool {
    matches!(
        content_type,
        Some("application/pdf") | Some("application/octet-stream")
    ) || filename.to_ascii_lowercase().ends_with(".pdf")
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    text: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct QueryResponse {
    matches: Vec<QueryMatch>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    let top_k = req.top_k.unwrap_or(state.services.config.retrieval.top_k);
    if top_k == 0 {
        return Err(bad_request("top_k must be >= 1"));
    }

    let matches = query_similar(
        state.services.embedder.as_ref(),
        state.services.store.as_ref(),
        &req.text,
        top_k,
    )
    .await?;
    Ok(Json(QueryResponse { matches }))
}
