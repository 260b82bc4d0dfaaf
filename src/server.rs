//! HTTP API for uploads, chat and document management.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Welcome message |
//! | `GET`  | `/api/test` | Liveness message |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/upload` | Multipart upload (`file` part), stored in the watched folder and indexed |
//! | `POST` | `/api/chat` | Retrieve contexts and generate an answer |
//! | `POST` | `/api/reindex-all` | Clear the registry and index the whole watched folder again |
//! | `GET`  | `/api/list-documents` | Indexed sources and the documents in the watched folder |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unsupported_format` (400),
//! `internal` (500). Internal error details are logged, not returned.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser
//! front-end can be served from a different origin.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::{ChatAnswer, Engine};
use crate::extract::{DocumentFormat, ExtractError, ALLOWED_EXTENSIONS};
use crate::models::DocumentListing;

/// Largest accepted request body (uploads included).
const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Build the router over a shared engine.
pub fn build_router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/api/test", get(handle_test))
        .route("/health", get(handle_health))
        .route("/api/upload", post(handle_upload))
        .route("/api/chat", post(handle_chat))
        .route("/api/reindex-all", post(handle_reindex_all))
        .route("/api/list-documents", get(handle_list_documents))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(engine)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(engine: Arc<Engine>) -> anyhow::Result<()> {
    let bind_addr = engine.config().server.bind.clone();
    let app = build_router(engine);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "HTTP server listening");
    axum::serve(listener, app).await?;

    Ok(())
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

fn unsupported_format() -> AppError {
    let allowed: Vec<String> = ALLOWED_EXTENSIONS.iter().map(|e| format!(".{}", e)).collect();
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "unsupported_format".to_string(),
        message: format!("Unsupported file format. Allowed formats: {}", allowed.join(", ")),
    }
}

/// Log the full error chain and return a generic 500.
fn internal(context: &str, err: anyhow::Error) -> AppError {
    tracing::error!("{}: {:#}", context, err);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{} failed", context),
    }
}

// ============ Simple endpoints ============

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to the ragdrop API!".to_string(),
    })
}

async fn handle_test() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Hello from the ragdrop API!".to_string(),
    })
}

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

// ============ POST /api/upload ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    filename: String,
    format: String,
    chunks: usize,
}

/// Handler for `POST /api/upload`.
///
/// Reads the `file` part, sanitizes its name, checks the extension, then
/// stores and indexes it. A document whose text cannot be extracted is a
/// client error.
async fn handle_upload(
    State(engine): State<Arc<Engine>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let client_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
        upload = Some((client_name, bytes));
        break;
    }

    let (client_name, bytes) = upload.ok_or_else(|| bad_request("No file part"))?;
    if client_name.is_empty() {
        return Err(bad_request("No selected file"));
    }
    let filename = sanitize_filename(&client_name).ok_or_else(|| bad_request("Invalid file name"))?;
    if DocumentFormat::from_path(Path::new(&filename)).is_none() {
        return Err(unsupported_format());
    }

    let outcome = match engine.ingest_upload(&filename, &bytes).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let extraction = e
                .chain()
                .find_map(|c| c.downcast_ref::<ExtractError>())
                .filter(|x| !matches!(x, ExtractError::Io { .. }))
                .map(|x| x.to_string());
            return Err(match extraction {
                Some(reason) => {
                    tracing::warn!(file = %filename, "upload rejected: {}", reason);
                    bad_request(format!("Could not extract text from {}", filename))
                }
                None => internal("upload", e),
            });
        }
    };

    Ok(Json(UploadResponse {
        message: format!(
            "File processed with {} chunks stored",
            outcome.report.stored
        ),
        filename: outcome.filename,
        format: outcome.format.extension().to_string(),
        chunks: outcome.report.chunks,
    }))
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Keeps the last component of either separator style, turns whitespace
/// into `_`, drops everything except ASCII alphanumerics, `.`, `_` and
/// `-`, and strips leading dots and underscores. `None` if nothing is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    history: Option<Vec<i64>>,
}

async fn handle_chat(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatAnswer>, AppError> {
    let query = req.query.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    Ok(Json(engine.chat(&query, req.history).await))
}

// ============ POST /api/reindex-all ============

#[derive(Serialize)]
struct ReindexResponse {
    message: String,
    files_processed: usize,
}

async fn handle_reindex_all(
    State(engine): State<Arc<Engine>>,
) -> Result<Json<ReindexResponse>, AppError> {
    let files_processed = engine
        .reindex_all()
        .await
        .map_err(|e| internal("reindex", e))?;
    Ok(Json(ReindexResponse {
        message: format!(
            "Reindexed {} documents from {}",
            files_processed,
            engine.watch_dir().display()
        ),
        files_processed,
    }))
}

// ============ GET /api/list-documents ============

async fn handle_list_documents(
    State(engine): State<Arc<Engine>>,
) -> Result<Json<DocumentListing>, AppError> {
    engine
        .list_documents()
        .map(Json)
        .map_err(|e| internal("list documents", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(
            sanitize_filename("../../etc/passwd.pdf").as_deref(),
            Some("passwd.pdf")
        );
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\Report Q3.docx").as_deref(),
            Some("Report_Q3.docx")
        );
    }

    #[test]
    fn test_sanitize_removes_unsafe_characters() {
        assert_eq!(
            sanitize_filename("résumé (final).pdf").as_deref(),
            Some("rsum_final.pdf")
        );
        assert_eq!(sanitize_filename(".hidden.pptx").as_deref(), Some("hidden.pptx"));
    }

    #[test]
    fn test_sanitize_rejects_empty_result() {
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename("..."), None);
        assert_eq!(sanitize_filename("dir/"), None);
    }

    #[test]
    fn test_unsupported_format_lists_extensions() {
        let err = unsupported_format();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "unsupported_format");
        assert!(err.message.ends_with(".pdf, .docx, .pptx"));
    }
}
