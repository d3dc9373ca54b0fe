//! Search request/response types and retrieval-setting resolution.
//!
//! The orchestrator that actually runs a search lives in the app crate
//! (it needs a runtime for timeouts and concurrent fan-out). This module
//! holds the pieces that are pure: the method enum, the request and hit
//! shapes, the precedence rules for tuning values, and the optional
//! distance cut-off callers may apply to hybrid results.
//!
//! # Setting precedence
//!
//! For each of `top_k`, method, dense/sparse weight, and RRF `k`, the first
//! value found wins:
//!
//! 1. the request override,
//! 2. the named profile the request asked for,
//! 3. the default profile of the request's data source,
//! 4. the hard defaults (`top_k = 10`, `HYBRID`, `0.7`, `0.3`, `k = 60`).

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::fusion::{FusionParams, DEFAULT_DENSE_WEIGHT, DEFAULT_RRF_K, DEFAULT_SPARSE_WEIGHT};
use crate::models::{ItemType, ScopeFilter, SearchProfile};

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 2;

/// Which retrievers a search runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SearchMethod {
    #[serde(alias = "dense", alias = "semantic")]
    Dense,
    #[serde(alias = "sparse", alias = "keyword")]
    Sparse,
    #[default]
    #[serde(alias = "hybrid")]
    Hybrid,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::Dense => "DENSE",
            SearchMethod::Sparse => "SPARSE",
            SearchMethod::Hybrid => "HYBRID",
        }
    }

    pub fn uses_dense(&self) -> bool {
        matches!(self, SearchMethod::Dense | SearchMethod::Hybrid)
    }

    pub fn uses_sparse(&self) -> bool {
        matches!(self, SearchMethod::Sparse | SearchMethod::Hybrid)
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" | "semantic" => Ok(SearchMethod::Dense),
            "sparse" | "keyword" => Ok(SearchMethod::Sparse),
            "hybrid" => Ok(SearchMethod::Hybrid),
            other => Err(EngineError::InvalidInput(format!(
                "unknown search method '{}'. Use dense, sparse, or hybrid",
                other
            ))),
        }
    }
}

/// One search invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub scope: ScopeFilter,
    #[serde(default)]
    pub method: Option<SearchMethod>,
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Named profile to resolve settings from.
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub dense_weight: Option<f64>,
    #[serde(default)]
    pub sparse_weight: Option<f64>,
    #[serde(default)]
    pub rrf_k: Option<f64>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: SearchMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_scope(mut self, scope: ScopeFilter) -> Self {
        self.scope = scope;
        self
    }
}

/// Deployment-level fallbacks, normally read from `[retrieval]` config.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalDefaults {
    pub top_k: usize,
    pub method: SearchMethod,
    pub dense_weight: f64,
    pub sparse_weight: f64,
    pub rrf_k: f64,
    /// Each retriever fetches `candidate_multiplier × top_k` before fusion.
    pub candidate_multiplier: usize,
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            method: SearchMethod::Hybrid,
            dense_weight: DEFAULT_DENSE_WEIGHT,
            sparse_weight: DEFAULT_SPARSE_WEIGHT,
            rrf_k: DEFAULT_RRF_K,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
        }
    }
}

/// Settings after precedence resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveSettings {
    pub top_k: usize,
    pub method: SearchMethod,
    pub fusion: FusionParams,
    /// Per-retriever fetch size in hybrid mode.
    pub candidate_k: usize,
}

/// Resolve effective settings for `req`.
///
/// `named` is the profile `req.profile` refers to (already loaded),
/// `scope_default` the default profile of the request's data source.
pub fn resolve_settings(
    req: &SearchRequest,
    named: Option<&SearchProfile>,
    scope_default: Option<&SearchProfile>,
    defaults: &RetrievalDefaults,
) -> Result<EffectiveSettings> {
    let profiles = [named, scope_default];
    let pick = |f: fn(&SearchProfile) -> Option<f64>| profiles.iter().flatten().find_map(|p| f(p));

    let top_k = req
        .top_k
        .or_else(|| profiles.iter().flatten().find_map(|p| p.top_k))
        .unwrap_or(defaults.top_k);
    let method = req
        .method
        .or_else(|| profiles.iter().flatten().find_map(|p| p.search_method))
        .unwrap_or(defaults.method);
    let dense_weight = req
        .dense_weight
        .or_else(|| pick(|p| p.dense_weight))
        .unwrap_or(defaults.dense_weight);
    let sparse_weight = req
        .sparse_weight
        .or_else(|| pick(|p| p.sparse_weight))
        .unwrap_or(defaults.sparse_weight);
    let k = req.rrf_k.or_else(|| pick(|p| p.rrf_k)).unwrap_or(defaults.rrf_k);

    if top_k == 0 {
        return Err(EngineError::InvalidInput("top_k must be >= 1".into()).into());
    }
    for (name, w) in [("dense_weight", dense_weight), ("sparse_weight", sparse_weight)] {
        if !w.is_finite() || w < 0.0 {
            return Err(EngineError::InvalidInput(format!("{} must be a finite value >= 0", name)).into());
        }
    }
    if !k.is_finite() || k < 0.0 {
        return Err(EngineError::InvalidInput("rrf_k must be a finite value >= 0".into()).into());
    }

    Ok(EffectiveSettings {
        top_k,
        method,
        fusion: FusionParams {
            dense_weight,
            sparse_weight,
            k,
        },
        candidate_k: top_k.saturating_mul(defaults.candidate_multiplier.max(1)),
    })
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub item_type: ItemType,
    pub source_id: String,
    pub data_source_id: Option<String>,
    /// Cosine similarity, rounded to 4 decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_score: Option<f64>,
    /// Fused RRF score (hybrid mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_score: Option<f64>,
    pub metadata: serde_json::Value,
}

/// Distance cut-off applied by schema-search callers.
pub const DEFAULT_MAX_DISTANCE: f64 = 0.55;
/// Matches kept regardless of distance.
pub const DEFAULT_MIN_KEEP: usize = 3;

/// Keep the first `min_keep` hits unconditionally, then only hits whose
/// cosine distance (`1 - dense_score`) is within `max_distance`.
///
/// Hits without a dense score are only kept through the `min_keep` floor.
/// This is an optional post-filter; the engine never applies it itself.
pub fn apply_distance_cutoff(hits: Vec<SearchHit>, max_distance: f64, min_keep: usize) -> Vec<SearchHit> {
    hits.into_iter()
        .enumerate()
        .filter(|(i, hit)| {
            *i < min_keep
                || hit
                    .dense_score
                    .map(|s| 1.0 - s <= max_distance)
                    .unwrap_or(false)
        })
        .map(|(_, hit)| hit)
        .collect()
}
