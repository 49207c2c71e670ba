//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/ingest` | Ingest `{"rows": [..]}` |
//! | `POST` | `/api/search` | Similarity search plus report |
//! | `POST` | `/api/toolcall_days` | Tool dispatch for a user message |
//! | `GET`  | `/api/db/stats` | Incident and embedding counts |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": true, "message": "query must not be empty" }
//! ```
//!
//! `400` for invalid requests, `500` for store or chat failures. A failed
//! tool call inside a successful dispatch is not an HTTP error; it appears
//! as an `error: true` entry in the result mapping.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::dispatch::{DispatchOutcome, Dispatcher, ToolResults};
use crate::embedding::{self, EmbeddingProvider};
use crate::ingest::{Ingestor, RawRow};
use crate::models::{ContentType, SearchMatch};
use crate::search::{search, SearchParams};
use crate::stats::collect_stats;
use crate::store::sqlite::SqliteStore;
use crate::store::RecordStore;
use crate::tools::{ToolContext, ToolRegistry};

const DEFAULT_TOOL_MESSAGE: &str = "Get incidents created from last 7 days";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RecordStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Wire up SQLite, the embedding provider and the chat dispatcher.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::new(pool));
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::from(embedding::create_provider(&config.embedding)?);
        let dispatcher = Dispatcher::from_config(
            &config.chat,
            ToolRegistry::with_builtins(),
            ToolContext::new(store.clone()),
        );

        Ok(Self {
            config: Arc::new(config.clone()),
            store,
            embedder,
            dispatcher: Arc::new(dispatcher),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ingest", post(handle_ingest))
        .route("/api/search", post(handle_search))
        .route("/api/toolcall_days", post(handle_toolcall_days))
        .route("/api/db/stats", get(handle_db_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on http://{}", bind_addr);
    println!("incident-rag server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: bool,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: true,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
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

// ============ POST /api/ingest ============

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub error: bool,
    pub message: String,
    pub processed_records: usize,
    pub skipped_records: usize,
    pub total_records: usize,
    pub without_embeddings: usize,
}

pub async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    if req.rows.is_empty() {
        return Err(bad_request("rows must not be empty"));
    }

    let summary = Ingestor::new(
        state.store.as_ref(),
        state.embedder.as_ref(),
        &state.config.ingest,
    )
    .ingest(&req.rows)
    .await;

    Ok(Json(IngestResponse {
        error: false,
        message: "Data ingested successfully".to_string(),
        processed_records: summary.processed,
        skipped_records: summary.skipped,
        total_records: summary.total,
        without_embeddings: summary.without_embeddings,
    }))
}

// ============ POST /api/search ============

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<i64>,
    pub content_type: Option<String>,
    pub product_filter: Option<String>,
    pub similarity_threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SearchPayload {
    pub bugs: Vec<SearchMatch>,
    pub report: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub error: bool,
    pub message: String,
    pub results: SearchPayload,
}

impl SearchRequest {
    fn into_params(self, config: &Config) -> Result<SearchParams, AppError> {
        if self.query.trim().is_empty() {
            return Err(bad_request("query must not be empty"));
        }

        let mut params = SearchParams::new(self.query, &config.retrieval);
        if let Some(limit) = self.limit {
            if limit < 1 {
                return Err(bad_request("limit must be >= 1"));
            }
            params.limit = limit;
        }
        if let Some(threshold) = self.similarity_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(bad_request("similarity_threshold must be between 0 and 1"));
            }
            params.similarity_threshold = threshold;
        }
        params.content_type = self
            .content_type
            .filter(|ct| !ct.trim().is_empty())
            .map(|ct| ct.parse::<ContentType>())
            .transpose()
            .map_err(|e| bad_request(e.to_string()))?;
        params.product_filter = self.product_filter.filter(|p| !p.trim().is_empty());

        Ok(params)
    }
}

pub async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let params = req.into_params(&state.config)?;
    let results = search(state.store.as_ref(), state.embedder.as_ref(), &params).await;

    Ok(Json(SearchResponse {
        error: false,
        message: "Search completed successfully".to_string(),
        results: SearchPayload {
            bugs: results.matches,
            report: results.report,
        },
    }))
}

// ============ POST /api/toolcall_days ============

#[derive(Debug, Deserialize)]
pub struct ToolCallRequest {
    pub message: Option<String>,
}

/// Returns the tool-result mapping. A direct model answer yields an
/// empty mapping; a chat failure is a `500` carrying the error result.
pub async fn handle_toolcall_days(
    State(state): State<AppState>,
    Json(req): Json<ToolCallRequest>,
) -> Response {
    let message = req
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TOOL_MESSAGE.to_string());

    match state.dispatcher.dispatch(&message).await {
        DispatchOutcome::Tools(results) => Json(results).into_response(),
        DispatchOutcome::Direct(_) => Json(ToolResults::new()).into_response(),
        DispatchOutcome::Failed(result) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(result)).into_response()
        }
    }
}

// ============ GET /api/db/stats ============

#[derive(Debug, Serialize)]
pub struct DbCounts {
    pub bug_count: i64,
    pub bug_embedding_count: i64,
}

#[derive(Debug, Serialize)]
pub struct DbStatsResponse {
    pub error: bool,
    pub data: DbCounts,
}

pub async fn handle_db_stats(
    State(state): State<AppState>,
) -> Result<Json<DbStatsResponse>, AppError> {
    let stats = collect_stats(state.store.as_ref())
        .await
        .map_err(|e| internal(format!("Error getting database statistics: {}", e)))?;

    Ok(Json(DbStatsResponse {
        error: false,
        data: DbCounts {
            bug_count: stats.incidents,
            bug_embedding_count: stats.embeddings,
        },
    }))
}
