//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version and provider state) |
//! | `POST` | `/search` | Run a [`SearchRequest`] |
//! | `POST` | `/sync/item` | Sync one source object from the catalog |
//! | `POST` | `/sync/scope` | Sync every object of a data source |
//! | `POST` | `/embed` | Batch-embed pending items |
//! | `GET`  | `/items/{id}` | Fetch one index item |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid input: top_k must be >= 1" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `provider_error` (502), `timeout` (504), `internal` (500).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use catalog_search_core::embedding::EmbeddingProvider;
use catalog_search_core::models::{ItemType, ScopeFilter};
use catalog_search_core::search::SearchRequest;
use catalog_search_core::store::Store;
use catalog_search_core::sync::{sync_all_for_scope, sync_item, SyncOutcome, SyncReport};
use catalog_search_core::EngineError;

use crate::catalog::JsonCatalog;
use crate::config::Config;
use crate::embed_cmd::{batch_embed, BatchEmbedReport};
use crate::embedding::create_provider;
use crate::get::{get_item, ItemResponse};
use crate::search::{SearchEngine, SearchResponse};
use crate::sqlite_store::SqliteStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
    engine: Arc<SearchEngine>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let engine = SearchEngine::from_config(&config, Arc::clone(&store), Arc::clone(&provider));
        Self {
            config: Arc::new(config),
            store,
            provider,
            engine: Arc::new(engine),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/sync/item", post(handle_sync_item))
        .route("/sync/scope", post(handle_sync_scope))
        .route("/embed", post(handle_embed))
        .route("/items/{id}", get(handle_get_item))
        .layer(cors)
        .with_state(state)
}

/// Binds `[server].bind` and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(config).await?);
    let provider = create_provider(&config.embedding)?;
    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(config.clone(), store, provider));

    info!(bind = %bind_addr, "http server starting");
    println!("catsearch listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
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
    code: &'static str,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: &'static str,
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

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let (status, code) = match EngineError::from_anyhow(&err) {
            Some(EngineError::NotFound { .. }) => (StatusCode::NOT_FOUND, "not_found"),
            Some(EngineError::InvalidInput(_)) => (StatusCode::BAD_REQUEST, "bad_request"),
            Some(EngineError::Provider(_)) => (StatusCode::BAD_GATEWAY, "provider_error"),
            Some(EngineError::Timeout(_)) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            None => {
                error!(error = %format!("{:#}", err), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code,
            message: format!("{:#}", err),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    embedding_model: String,
    embeddings_enabled: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        embedding_model: state.provider.model_name().to_string(),
        embeddings_enabled: state.provider.dims() > 0,
    })
}

// ============ POST /search ============

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let resp = state.engine.search(&req).await?;
    Ok(Json(resp))
}

// ============ POST /sync/* ============

#[derive(Deserialize)]
struct SyncItemRequest {
    source_id: String,
    item_type: String,
}

async fn handle_sync_item(
    State(state): State<AppState>,
    Json(req): Json<SyncItemRequest>,
) -> Result<Json<SyncOutcome>, AppError> {
    if req.source_id.trim().is_empty() {
        return Err(bad_request("source_id must not be empty"));
    }
    let item_type: ItemType = req
        .item_type
        .parse()
        .map_err(|e: EngineError| bad_request(e.to_string()))?;
    let catalog = JsonCatalog::load(&state.config.catalog.path)?;
    let outcome = sync_item(
        state.store.as_ref(),
        &catalog,
        &req.source_id,
        item_type,
        state.config.chunking.params(),
    )
    .await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct SyncScopeRequest {
    data_source_id: String,
}

async fn handle_sync_scope(
    State(state): State<AppState>,
    Json(req): Json<SyncScopeRequest>,
) -> Result<Json<SyncReport>, AppError> {
    if req.data_source_id.trim().is_empty() {
        return Err(bad_request("data_source_id must not be empty"));
    }
    let catalog = JsonCatalog::load(&state.config.catalog.path)?;
    let report = sync_all_for_scope(
        state.store.as_ref(),
        &catalog,
        &req.data_source_id,
        state.config.chunking.params(),
    )
    .await?;
    Ok(Json(report))
}

// ============ POST /embed ============

#[derive(Deserialize, Default)]
struct EmbedRequest {
    #[serde(default)]
    scope: ScopeFilter,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    limit: Option<usize>,
}

async fn handle_embed(
    State(state): State<AppState>,
    Json(req): Json<EmbedRequest>,
) -> Result<Json<BatchEmbedReport>, AppError> {
    let report = batch_embed(
        Arc::clone(&state.store),
        Arc::clone(&state.provider),
        &req.scope,
        req.force,
        req.limit,
        state.config.embedding.max_concurrency,
    )
    .await?;
    Ok(Json(report))
}

// ============ GET /items/{id} ============

async fn handle_get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ItemResponse>, AppError> {
    let item = get_item(state.store.as_ref(), &id).await?;
    Ok(Json(item))
}
