//! Storage abstraction for indexable items, search profiles, and telemetry.
//!
//! The [`Store`] trait defines every persistence operation the engine needs,
//! so scorers, the sync pipeline, and the search orchestrator can run
//! against SQLite in production and [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Invariants every backend upholds
//!
//! - [`update_content`](Store::update_content) writes content, hash, tokens,
//!   and token count together and clears `last_embedded_at` in the same
//!   write.
//! - [`set_embedding`](Store::set_embedding) only applies when the item's
//!   current content hash equals the hash the vector was computed from.
//! - Deletes are idempotent: removing something that does not exist is `Ok`.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{
    IndexItem, ItemContent, ItemType, ScopeFilter, SearchLogEntry, SearchProfile,
};

/// A candidate returned from vector similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorCandidate {
    pub item_id: String,
    /// Cosine similarity, full precision.
    pub similarity: f64,
}

/// Item counts for a scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemCounts {
    pub total: u64,
    pub active: u64,
    pub embedded: u64,
    pub stale: u64,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_item`](Store::insert_item) | Persist a new item |
/// | [`get_item`](Store::get_item) | Load one item by id |
/// | [`find_by_source`](Store::find_by_source) | All items for `(source_id, type)` |
/// | [`find_by_source_prefix`](Store::find_by_source_prefix) | Items whose source id starts with a prefix |
/// | [`update_metadata`](Store::update_metadata) | Replace only the metadata map |
/// | [`update_content`](Store::update_content) | Replace content and mark stale |
/// | [`set_active`](Store::set_active) | Toggle the activity flag |
/// | [`set_data_source`](Store::set_data_source) | Move an item to another data source |
/// | [`set_embedding`](Store::set_embedding) | Store a vector computed for a given hash |
/// | [`delete_item`](Store::delete_item) | Remove one item |
/// | [`delete_by_source`](Store::delete_by_source) | Remove all items for `(source_id, type)` |
/// | [`list_items`](Store::list_items) | Items in scope (the sparse corpus) |
/// | [`pending_embeddings`](Store::pending_embeddings) | Items that need (re-)embedding |
/// | [`vector_search`](Store::vector_search) | Top-K by cosine similarity |
/// | [`get_profile`](Store::get_profile) | Named search profile |
/// | [`get_scope_default_profile`](Store::get_scope_default_profile) | Default profile of a data source |
/// | [`upsert_profile`](Store::upsert_profile) | Create or replace a profile |
/// | [`list_profiles`](Store::list_profiles) | All profiles |
/// | [`append_search_log`](Store::append_search_log) | Append a telemetry row |
/// | [`recent_search_logs`](Store::recent_search_logs) | Newest telemetry rows |
/// | [`count_items`](Store::count_items) | Item counts for a scope |
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_item(&self, item: &IndexItem) -> Result<()>;

    async fn get_item(&self, id: &str) -> Result<Option<IndexItem>>;

    /// Every item for the pair, newest `created_at` first. More than one
    /// result means historical duplicates that the sync pipeline repairs.
    async fn find_by_source(&self, source_id: &str, item_type: ItemType) -> Result<Vec<IndexItem>>;

    async fn find_by_source_prefix(
        &self,
        prefix: &str,
        item_type: ItemType,
    ) -> Result<Vec<IndexItem>>;

    /// Returns `false` if the item does not exist.
    async fn update_metadata(&self, id: &str, metadata: &serde_json::Value) -> Result<bool>;

    /// Replace the content quadruple and clear `last_embedded_at` atomically.
    /// Returns `false` if the item does not exist.
    async fn update_content(
        &self,
        id: &str,
        content: &ItemContent,
        metadata: &serde_json::Value,
    ) -> Result<bool>;

    async fn set_active(&self, id: &str, active: bool) -> Result<bool>;

    /// `None` makes the item global. Returns `false` if the item does not exist.
    async fn set_data_source(&self, id: &str, data_source_id: Option<&str>) -> Result<bool>;

    /// Store `vector` and stamp `last_embedded_at`, but only if the item's
    /// content hash still equals `expected_hash`. Returns whether it applied.
    async fn set_embedding(
        &self,
        id: &str,
        vector: &[f32],
        model: &str,
        expected_hash: &str,
    ) -> Result<bool>;

    /// Returns `false` when nothing was deleted.
    async fn delete_item(&self, id: &str) -> Result<bool>;

    async fn delete_by_source(&self, source_id: &str, item_type: ItemType) -> Result<u64>;

    async fn list_items(&self, scope: &ScopeFilter, active_only: bool) -> Result<Vec<IndexItem>>;

    /// Active items in scope that were never embedded or whose content
    /// changed since. With `force`, every active item in scope.
    async fn pending_embeddings(
        &self,
        scope: &ScopeFilter,
        force: bool,
        limit: Option<usize>,
    ) -> Result<Vec<IndexItem>>;

    /// Active items in scope holding a vector, ranked by cosine similarity
    /// descending (ties by id), truncated to `limit`.
    async fn vector_search(
        &self,
        query_vec: &[f32],
        scope: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<VectorCandidate>>;

    async fn get_profile(&self, name: &str) -> Result<Option<SearchProfile>>;

    async fn get_scope_default_profile(&self, data_source_id: &str)
        -> Result<Option<SearchProfile>>;

    async fn upsert_profile(&self, profile: &SearchProfile) -> Result<()>;

    async fn list_profiles(&self) -> Result<Vec<SearchProfile>>;

    async fn append_search_log(&self, entry: &SearchLogEntry) -> Result<()>;

    async fn recent_search_logs(&self, limit: usize) -> Result<Vec<SearchLogEntry>>;

    async fn count_items(&self, scope: &ScopeFilter) -> Result<ItemCounts>;
}

/// Rank `(id, vector)` pairs by cosine similarity to `query_vec`.
///
/// Vectors whose dimension differs from the query's (left over from an
/// earlier model) are not candidates. Shared by backends that compute
/// vector search in-process.
pub fn rank_by_similarity<'a, I>(query_vec: &[f32], vectors: I, limit: usize) -> Vec<VectorCandidate>
where
    I: IntoIterator<Item = (&'a str, &'a [f32])>,
{
    let mut candidates: Vec<VectorCandidate> = vectors
        .into_iter()
        .filter(|(_, v)| v.len() == query_vec.len())
        .map(|(id, v)| VectorCandidate {
            item_id: id.to_string(),
            similarity: crate::embedding::cosine_similarity(query_vec, v),
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    candidates.truncate(limit);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_skips_mismatched_dimensions() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let old_model = [1.0f32, 0.0, 0.0];
        let ranked = rank_by_similarity(
            &[1.0, 0.0],
            vec![("a", &a[..]), ("b", &b[..]), ("old", &old_model[..])],
            10,
        );
        let ids: Vec<&str> = ranked.iter().map(|c| c.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
