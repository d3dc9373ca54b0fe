//! # Catalog Search Core
//!
//! Runtime-free logic for the hybrid retrieval engine: the indexable item
//! model, tokenizer, BM25 sparse scorer, reciprocal rank fusion, document
//! chunking, the [`store::Store`] abstraction, and the sync pipeline that keeps
//! items consistent with source business objects.
//!
//! This crate has no tokio, sqlx, or HTTP dependencies. The application crate
//! supplies the SQLite store, concrete embedding providers, timeouts, and the
//! search orchestrator.

pub mod bm25;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod models;
pub mod search;
pub mod store;
pub mod sync;
pub mod tokenize;

pub use error::EngineError;
pub use models::{IndexItem, ItemContent, ItemType, ScopeFilter};
