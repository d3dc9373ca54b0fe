//! Search orchestrator: DENSE, SPARSE, and HYBRID retrieval.
//!
//! # Mode selection
//!
//! | Method | Behavior |
//! |--------|----------|
//! | `DENSE` | dense retrieval only, `top_k` results |
//! | `SPARSE` | BM25 over the active scoped corpus, `top_k` results |
//! | `HYBRID` | dense and sparse run concurrently, each over-fetching `candidate_multiplier × top_k`, then weighted RRF and truncation to `top_k` |
//!
//! Settings resolve as request override > named profile > scope default
//! profile > `[retrieval]` config (see [`resolve_settings`]).
//!
//! Each search records per-stage wall-clock timings and appends a
//! [`SearchLogEntry`]. A failing log write is reported at `warn` and never
//! fails the search.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use catalog_search_core::bm25::{self, Bm25Params};
use catalog_search_core::embedding::{round_score, EmbeddingProvider};
use catalog_search_core::fusion::{rrf_fuse, RankedHit};
use catalog_search_core::models::{IndexItem, SearchLogEntry};
use catalog_search_core::search::{
    resolve_settings, EffectiveSettings, RetrievalDefaults, SearchHit, SearchMethod, SearchRequest,
};
use catalog_search_core::store::Store;
use catalog_search_core::tokenize::tokenize;
use catalog_search_core::EngineError;

use crate::config::Config;
use crate::dense::{DenseOutcome, DenseRetriever};
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteStore;

/// Wall-clock time spent in each stage, in milliseconds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fusion_ms: Option<u64>,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub method: SearchMethod,
    pub top_k: usize,
    /// The dense path was requested but produced no signal.
    pub dense_degraded: bool,
    pub timings: StageTimings,
    pub results: Vec<SearchHit>,
}

/// Runs searches against a store with an explicitly supplied provider.
pub struct SearchEngine {
    store: Arc<dyn Store>,
    dense: DenseRetriever,
    defaults: RetrievalDefaults,
    bm25: Bm25Params,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn Store>, dense: DenseRetriever, defaults: RetrievalDefaults) -> Self {
        Self {
            store,
            dense,
            defaults,
            bm25: Bm25Params::default(),
        }
    }

    /// Wire an engine from config around an existing store and provider.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn Store>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let dense = DenseRetriever::new(provider, config.retrieval.dense_timeout());
        Self::new(store, dense, config.retrieval.defaults())
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn search(&self, req: &SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        let settings = self.settings_for(req).await?;

        if req.query.trim().is_empty() {
            return Ok(SearchResponse {
                query: req.query.clone(),
                method: settings.method,
                top_k: settings.top_k,
                dense_degraded: false,
                timings: StageTimings::default(),
                results: Vec::new(),
            });
        }

        let fetch_k = match settings.method {
            SearchMethod::Hybrid => settings.candidate_k,
            _ => settings.top_k,
        };

        let dense_fut = async {
            if !settings.method.uses_dense() {
                return None;
            }
            let t = Instant::now();
            let out = self
                .dense
                .retrieve(self.store.as_ref(), &req.query, &req.scope, fetch_k)
                .await;
            Some((out, elapsed_ms(t)))
        };

        let sparse_fut = async {
            if !settings.method.uses_sparse() {
                return Ok::<_, anyhow::Error>(None);
            }
            let t = Instant::now();
            let corpus = self.store.list_items(&req.scope, true).await?;
            let mut hits = bm25::rank(&tokenize(&req.query), &corpus, self.bm25);
            hits.truncate(fetch_k);
            Ok(Some((hits, corpus, elapsed_ms(t))))
        };

        let (dense_res, sparse_res) = tokio::join!(dense_fut, sparse_fut);
        let sparse_res = sparse_res?;

        let mut timings = StageTimings::default();
        let mut dense_degraded = false;
        let mut dense_hits: Vec<RankedHit> = Vec::new();
        if let Some((DenseOutcome { hits, degraded }, ms)) = dense_res {
            timings.dense_ms = Some(ms);
            dense_degraded = degraded;
            dense_hits = hits;
        }

        let mut sparse_hits: Vec<RankedHit> = Vec::new();
        let mut loaded: HashMap<String, IndexItem> = HashMap::new();
        if let Some((hits, corpus, ms)) = sparse_res {
            timings.sparse_ms = Some(ms);
            sparse_hits = hits
                .into_iter()
                .map(|h| RankedHit::new(h.item_id, h.score))
                .collect();
            loaded = corpus.into_iter().map(|i| (i.id.clone(), i)).collect();
        }

        // (item_id, dense, sparse, hybrid)
        let ranked: Vec<(String, Option<f64>, Option<f64>, Option<f64>)> = match settings.method {
            SearchMethod::Dense => dense_hits
                .into_iter()
                .take(settings.top_k)
                .map(|h| (h.item_id, Some(h.score), None, None))
                .collect(),
            SearchMethod::Sparse => sparse_hits
                .into_iter()
                .take(settings.top_k)
                .map(|h| (h.item_id, None, Some(h.score), None))
                .collect(),
            SearchMethod::Hybrid => {
                let t = Instant::now();
                let fused = rrf_fuse(&dense_hits, &sparse_hits, settings.fusion, settings.top_k);
                timings.fusion_ms = Some(elapsed_ms(t));
                fused
                    .into_iter()
                    .map(|f| (f.item_id, f.dense_score, f.sparse_score, Some(f.hybrid_score)))
                    .collect()
            }
        };

        let mut results = Vec::with_capacity(ranked.len());
        for (id, dense, sparse, hybrid) in ranked {
            let item = match loaded.remove(&id) {
                Some(item) => item,
                None => match self.store.get_item(&id).await? {
                    Some(item) => item,
                    // Deleted between retrieval and hydration.
                    None => continue,
                },
            };
            results.push(to_hit(item, dense.map(round_score), sparse, hybrid));
        }

        timings.total_ms = elapsed_ms(started);
        debug!(
            query = %req.query,
            method = %settings.method,
            results = results.len(),
            dense_degraded,
            total_ms = timings.total_ms,
            "search complete"
        );

        let response = SearchResponse {
            query: req.query.clone(),
            method: settings.method,
            top_k: settings.top_k,
            dense_degraded,
            timings,
            results,
        };
        self.record(req, &response).await;
        Ok(response)
    }

    async fn settings_for(&self, req: &SearchRequest) -> Result<EffectiveSettings> {
        let named = match &req.profile {
            Some(name) => Some(
                self.store
                    .get_profile(name)
                    .await?
                    .ok_or_else(|| EngineError::not_found("profile", name.as_str()))?,
            ),
            None => None,
        };
        let scope_default = match &req.scope.data_source_id {
            Some(ds) => self.store.get_scope_default_profile(ds).await?,
            None => None,
        };
        resolve_settings(req, named.as_ref(), scope_default.as_ref(), &self.defaults)
    }

    /// Append the search log entry. Failures are logged and swallowed.
    async fn record(&self, req: &SearchRequest, resp: &SearchResponse) {
        let entry = SearchLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            query: req.query.clone(),
            method: resp.method.as_str().to_string(),
            data_source_id: req.scope.data_source_id.clone(),
            top_k: resp.top_k,
            result_count: resp.results.len(),
            dense_ms: resp.timings.dense_ms,
            sparse_ms: resp.timings.sparse_ms,
            fusion_ms: resp.timings.fusion_ms,
            total_ms: resp.timings.total_ms,
            dense_degraded: resp.dense_degraded,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.append_search_log(&entry).await {
            warn!(error = %e, "failed to write search log");
        }
    }
}

fn to_hit(
    item: IndexItem,
    dense_score: Option<f64>,
    sparse_score: Option<f64>,
    hybrid_score: Option<f64>,
) -> SearchHit {
    SearchHit {
        content: item.content().to_string(),
        id: item.id,
        item_type: item.item_type,
        source_id: item.source_id,
        data_source_id: item.data_source_id,
        dense_score,
        sparse_score,
        hybrid_score,
        metadata: item.metadata,
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// CLI entry point for `catsearch search`.
pub async fn run_search(config: &Config, req: SearchRequest, json: bool) -> Result<()> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(config).await?);
    let provider = create_provider(&config.embedding)?;
    let engine = SearchEngine::from_config(config, store, provider);

    let resp = engine.search(&req).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    if resp.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    if resp.dense_degraded && resp.method.uses_dense() {
        println!("(dense retrieval unavailable; results are keyword-only)\n");
    }

    for (i, hit) in resp.results.iter().enumerate() {
        let score = hit
            .hybrid_score
            .or(hit.dense_score)
            .or(hit.sparse_score)
            .unwrap_or(0.0);
        println!(
            "{}. [{:.4}] {} {}",
            i + 1,
            score,
            hit.item_type,
            hit.source_id
        );
        println!("    id: {}", hit.id);
        let preview: String = hit.content.chars().take(160).collect();
        println!("    {}", preview.replace('\n', " | "));
        println!();
    }
    println!(
        "{} results ({}, {} ms)",
        resp.results.len(),
        resp.method,
        resp.timings.total_ms
    );

    Ok(())
}
