//! TOML configuration for the `catsearch` binary and HTTP server.
//!
//! Every section except `[db]` is optional and falls back to the engine
//! defaults. [`load_config`] validates ranges up front so the rest of the
//! application can trust the values.
//!
//! ```toml
//! [db]
//! path = "./data/catsearch.sqlite"
//!
//! [catalog]
//! path = "./data/catalog.json"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! top_k = 10
//! method = "hybrid"
//! dense_weight = 0.7
//! sparse_weight = 0.3
//! rrf_k = 60.0
//! candidate_multiplier = 2
//! dense_timeout_ms = 5000
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use catalog_search_core::fusion::{DEFAULT_DENSE_WEIGHT, DEFAULT_RRF_K, DEFAULT_SPARSE_WEIGHT};
use catalog_search_core::search::{
    RetrievalDefaults, SearchMethod, DEFAULT_CANDIDATE_MULTIPLIER, DEFAULT_TOP_K,
};
use catalog_search_core::sync::{ChunkingParams, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Location of the JSON source catalog read by `catsearch sync`.
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("./data/catalog.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub method: SearchMethod,
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f64,
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f64,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    #[serde(default = "default_dense_timeout_ms")]
    pub dense_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            method: SearchMethod::Hybrid,
            dense_weight: DEFAULT_DENSE_WEIGHT,
            sparse_weight: DEFAULT_SPARSE_WEIGHT,
            rrf_k: DEFAULT_RRF_K,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            dense_timeout_ms: default_dense_timeout_ms(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_dense_weight() -> f64 {
    DEFAULT_DENSE_WEIGHT
}
fn default_sparse_weight() -> f64 {
    DEFAULT_SPARSE_WEIGHT
}
fn default_rrf_k() -> f64 {
    DEFAULT_RRF_K
}
fn default_candidate_multiplier() -> usize {
    DEFAULT_CANDIDATE_MULTIPLIER
}
fn default_dense_timeout_ms() -> u64 {
    5000
}

impl RetrievalConfig {
    /// Hard defaults handed to setting resolution.
    pub fn defaults(&self) -> RetrievalDefaults {
        RetrievalDefaults {
            top_k: self.top_k,
            method: self.method,
            dense_weight: self.dense_weight,
            sparse_weight: self.sparse_weight,
            rrf_k: self.rrf_k,
            candidate_multiplier: self.candidate_multiplier,
        }
    }

    pub fn dense_timeout(&self) -> Duration {
        Duration::from_millis(self.dense_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama host, OpenAI-compatible gateway).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on simultaneous provider calls during batch embedding.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_concurrency() -> usize {
    1
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    // Retrieval
    let r = &config.retrieval;
    if r.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if r.candidate_multiplier < 1 {
        anyhow::bail!("retrieval.candidate_multiplier must be >= 1");
    }
    for (name, w) in [("dense_weight", r.dense_weight), ("sparse_weight", r.sparse_weight)] {
        if !w.is_finite() || w < 0.0 {
            anyhow::bail!("retrieval.{} must be >= 0.0", name);
        }
    }
    if !r.rrf_k.is_finite() || r.rrf_k < 0.0 {
        anyhow::bail!("retrieval.rrf_k must be >= 0.0");
    }
    if r.dense_timeout_ms == 0 {
        anyhow::bail!("retrieval.dense_timeout_ms must be > 0");
    }

    // Embedding
    let e = &config.embedding;
    if e.max_concurrency == 0 {
        anyhow::bail!("embedding.max_concurrency must be >= 1");
    }
    if e.is_enabled() {
        if e.dims.is_none() || e.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0 when provider is '{}'", e.provider);
        }
        if e.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                e.provider
            );
        }
    }

    match e.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"./x.sqlite\"\n").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.retrieval.method, SearchMethod::Hybrid);
        assert_eq!(config.chunking.params(), ChunkingParams::default());
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.embedding.max_concurrency, 1);
        assert_eq!(config.retrieval.dense_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_method_accepts_lowercase() {
        let config = parse_config(
            "[db]\npath = \"x\"\n[retrieval]\nmethod = \"keyword\"\ntop_k = 3\n",
        )
        .unwrap();
        assert_eq!(config.retrieval.method, SearchMethod::Sparse);
        assert_eq!(config.retrieval.defaults().top_k, 3);
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = [
            "[db]\npath = \"x\"\n[chunking]\nchunk_size = 0\n",
            "[db]\npath = \"x\"\n[retrieval]\ntop_k = 0\n",
            "[db]\npath = \"x\"\n[retrieval]\ndense_weight = -0.5\n",
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n",
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"cohere\"\nmodel = \"m\"\ndims = 3\n",
        ];
        for toml in bad {
            let config = parse_config(toml).unwrap();
            assert!(validate(&config).is_err(), "accepted: {}", toml);
        }
    }
}
