//! # Catalog Search
//!
//! Hybrid retrieval over a data catalog: tables, columns, sample queries,
//! and documents are mirrored into an index of text items, scored with BM25
//! and dense cosine similarity, and fused with weighted Reciprocal Rank
//! Fusion.
//!
//! The retrieval algorithms live in the runtime-free
//! [`catalog_search_core`] crate. This crate supplies the SQLite store, the
//! HTTP embedding providers, the JSON source catalog, and the `catsearch`
//! CLI and HTTP server around them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Catalog    │──▶│    Sync     │──▶│    SQLite    │
//! │  (JSON)     │   │ hash+chunk  │   │ items+vecs   │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │
//!                     ┌──────────────────────┤
//!                     ▼                      ▼
//!               ┌──────────┐           ┌──────────┐
//!               │  BM25    │           │  Dense   │
//!               └────┬─────┘           └────┬─────┘
//!                    └───────▶ RRF ◀────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! catsearch init
//! catsearch sync scope warehouse
//! catsearch embed --data-source warehouse
//! catsearch search "inactive users" --data-source warehouse
//! catsearch serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite pool |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | `Store` implementation over SQLite |
//! | [`catalog`] | JSON source catalog |
//! | [`ingest`] | `sync` commands |
//! | [`embedding`] | OpenAI, Ollama, and local embedding providers |
//! | [`embed_cmd`] | Batch embedding |
//! | [`dense`] | Dense retrieval with timeout and fail-soft |
//! | [`search`] | Search orchestrator |
//! | [`get`] | Item lookup |
//! | [`profiles`] | Search profile administration |
//! | [`stats`] | Index statistics |
//! | [`server`] | JSON HTTP API |
//! | [`logging`] | Tracing subscriber setup |

pub mod catalog;
pub mod config;
pub mod db;
pub mod dense;
pub mod embed_cmd;
pub mod embedding;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod profiles;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stats;

