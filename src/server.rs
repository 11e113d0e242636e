//! HTTP request layer.
//!
//! Exposes the RAG pipeline over a JSON HTTP API:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart document upload (`.pdf`, `.docx`, `.txt`) |
//! | `POST` | `/query`  | Ask a question; always 200, injection flagged in-band |
//! | `GET`  | `/status` | Process-local ingested-chunk counter |
//! | `GET`  | `/`       | Liveness probe |
//!
//! Every route passes through the rate limiter first (429 on violation).
//! Unexpected internal failures are logged with full detail server-side and
//! surfaced only as a generic 500 body — stack traces, credentials, and raw
//! backend errors never appear in a response.

use axum::{
    extract::{ConnectInfo, Multipart, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::extract;
use crate::guard::sanitize_input;
use crate::models::QueryRequest;
use crate::pipeline::{RagPipeline, DEFAULT_TOP_K};
use crate::ratelimit::RateLimiter;
use crate::storage::ObjectStore;

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor. Constructed once at startup; no module-level singletons.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<RagPipeline>,
    limiter: Arc<RateLimiter>,
    storage: Option<Arc<ObjectStore>>,
    /// Chunks ingested by this process. Not authoritative against the
    /// external index, which may have been populated elsewhere.
    documents_loaded: Arc<AtomicUsize>,
    input_max_chars: usize,
}

impl AppState {
    pub fn new(
        config: &Config,
        pipeline: Arc<RagPipeline>,
        storage: Option<Arc<ObjectStore>>,
    ) -> Self {
        Self {
            pipeline,
            limiter: Arc::new(RateLimiter::new(
                config.limits.max_requests,
                config.limits.window_seconds,
            )),
            storage,
            documents_loaded: Arc::new(AtomicUsize::new(0)),
            input_max_chars: config.security.input_max_chars,
        }
    }
}

/// Build the application router with all routes, the rate-limit middleware,
/// and a permissive CORS layer.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/status", get(handle_status))
        .route("/query", post(handle_query))
        .route("/upload", post(handle_upload))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process terminates.
pub async fn run_server(
    config: &Config,
    pipeline: Arc<RagPipeline>,
    storage: Option<Arc<ObjectStore>>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config, pipeline, storage);
    let app = build_router(state);

    info!(%bind_addr, "askdocs listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

// ============ Errors ============

/// Error that converts into an HTTP response with a `{"detail": ...}` body.
struct AppError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

fn bad_request(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        detail: detail.into(),
    }
}

fn internal_error() -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        detail: "Internal server error.".to_string(),
    }
}

// ============ Rate limiting ============

/// Identify the client for rate limiting: `X-Forwarded-For` when present
/// (first hop), else the peer address, else a shared fallback bucket.
fn client_id(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware applied ahead of every handler. On violation the handler is
/// never invoked.
async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let client = client_id(&req);
    if !state.limiter.check(&client) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "detail": "Rate limit exceeded. Try again later." })),
        )
            .into_response();
    }
    next.run(req).await
}

// ============ GET / ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// ============ GET /status ============

async fn handle_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "documents_loaded": state.documents_loaded.load(Ordering::SeqCst)
    }))
}

// ============ POST /query ============

/// Always responds 200: an injection rejection is a normal answer carrying
/// the notice text and `sources: null`, not an error status.
async fn handle_query(
    State(state): State<AppState>,
    Json(query): Json<QueryRequest>,
) -> Response {
    let question = sanitize_input(&query.question, state.input_max_chars);
    let top_k = query.top_k.unwrap_or(DEFAULT_TOP_K).max(1);

    let answer = state.pipeline.answer(&question, top_k).await;
    Json(answer).into_response()
}

// ============ POST /upload ============

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut filename = None;
    let mut bytes = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Malformed multipart body: {}", e)))?
    {
        if let Some(name) = field.file_name().map(|s| s.to_string()) {
            bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("Failed to read upload: {}", e)))?
                .to_vec();
            filename = Some(name);
            break;
        }
    }

    let filename = filename.ok_or_else(|| bad_request("No file field in upload."))?;

    if !extract::is_allowed(&filename) {
        return Err(bad_request(format!(
            "Unsupported file type: .{}. Supported types: .pdf, .docx, .txt",
            extract::file_extension(&filename)
        )));
    }

    if bytes.is_empty() {
        return Err(bad_request("Empty file upload."));
    }

    if let Some(ref storage) = state.storage {
        if let Err(e) = storage.put_object(&filename, &bytes).await {
            error!(filename = %filename, error = %e, "object store put failed");
            return Err(AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: "Failed to store uploaded file.".to_string(),
            });
        }
    }

    let text = extract::extract_text(&bytes, &filename).map_err(|e| {
        error!(filename = %filename, error = %e, "text extraction failed");
        internal_error()
    })?;

    let metadata = extract::file_metadata(&filename, bytes.len() as u64);
    let report = state.pipeline.ingest(&text, &metadata).await;

    state
        .documents_loaded
        .fetch_add(report.added, Ordering::SeqCst);

    Ok(Json(json!({
        "chunks": report.added,
        "failed": report.failed,
        "filename": filename,
        "size": bytes.len(),
    })))
}
