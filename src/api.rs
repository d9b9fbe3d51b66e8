//! HTTP surface for the PDF chat service.
//!
//! A compact Axum router with the endpoints the original product exposes:
//!
//! - `POST /upload_pdf` – Multipart PDF upload. Stores the file, runs the
//!   ingestion pipeline, and returns the storage URL plus the collection name
//!   so clients can pin follow-up questions to it.
//! - `POST /get_response` – Chat endpoint. Always answers HTTP 200; query
//!   failures are embedded in the reply body as `"Error: …"` text.
//! - `GET /healthcheck` – Liveness probe.
//! - `GET /metrics` – Ingestion and chat counters.
//!
//! Upload failures are mapped to proper HTTP statuses (`4xx` for malformed
//! requests, `500` with a `detail` body for pipeline failures); only the chat
//! path deliberately flattens errors into the 200 body.

use crate::processing::{IngestError, PipelineApi};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

// Axum caps request bodies at 2 MB by default, well under a typical PDF.
const UPLOAD_BODY_LIMIT_BYTES: usize = 50 * 1024 * 1024;

/// Build the HTTP router exposing the service surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route(
            "/upload_pdf",
            post(upload_pdf::<S>).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT_BYTES)),
        )
        .route("/get_response", post(get_response::<S>))
        .route("/healthcheck", get(healthcheck))
        .route("/metrics", get(get_metrics::<S>))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Success response for `POST /upload_pdf`.
#[derive(Serialize)]
struct UploadResponse {
    /// Human-readable confirmation.
    message: String,
    /// Public URL of the stored document.
    s3_url: String,
    /// Collection the document was indexed into.
    collection: String,
}

/// Upload a PDF, store it, and run the ingestion pipeline.
async fn upload_pdf<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: PipelineApi,
{
    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::bad_request(format!("Malformed multipart body: {error}")))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(str::to_string)
                .filter(|name| !name.trim().is_empty())
                .ok_or_else(|| AppError::bad_request("File part is missing a filename"))?;
            let bytes = field
                .bytes()
                .await
                .map_err(|error| AppError::bad_request(format!("Failed to read file: {error}")))?;
            file = Some((filename, bytes.to_vec()));
        }
    }

    let Some((filename, bytes)) = file else {
        return Err(AppError::bad_request("Missing 'file' part"));
    };
    if bytes.is_empty() {
        return Err(AppError::bad_request("Uploaded file is empty"));
    }

    let outcome = service.ingest(&filename, bytes).await?;
    tracing::info!(
        filename,
        key = %outcome.key,
        collection = %outcome.collection,
        chunks = outcome.chunk_count,
        "Upload request completed"
    );

    Ok(Json(UploadResponse {
        message: format!("PDF '{filename}' uploaded and indexed successfully."),
        s3_url: outcome.url,
        collection: outcome.collection,
    }))
}

/// Request body for `POST /get_response`.
#[derive(Deserialize)]
struct ChatRequest {
    /// Natural-language question.
    user_message: String,
    /// Optional explicit collection; defaults to the most recent ingestion.
    #[serde(default)]
    collection: Option<String>,
}

/// Response body for `POST /get_response`.
#[derive(Serialize)]
struct ChatResponse {
    bot_reply: String,
}

/// Answer a question. Always HTTP 200; failures live in the body.
async fn get_response<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse>
where
    S: PipelineApi,
{
    let bot_reply = service
        .ask(&request.user_message, request.collection)
        .await;
    Json(ChatResponse { bot_reply })
}

/// Liveness probe.
async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Return pipeline counters for observability.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: PipelineApi,
{
    Json(service.metrics_snapshot())
}

struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(inner: IngestError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: inner.to_string(),
        }
    }
}
