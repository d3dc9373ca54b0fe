//! Sync pipeline: keep indexable items consistent with source business objects.
//!
//! Owning modules call [`sync_item`] whenever a source object is created,
//! updated, deleted, or excluded, and [`sync_all_for_scope`] for a full
//! reconciliation of one data source.
//!
//! # Upsert rules
//!
//! | Situation | Action | Outcome |
//! |-----------|--------|---------|
//! | source missing or excluded | delete every item for the pair | `Deleted` |
//! | no item yet | insert | `Created` |
//! | same content hash | replace metadata only | `MetadataUpdated` |
//! | different content hash | replace content, mark stale | `ContentUpdated` |
//! | long-form document | drop old chunks, insert new ones | `Chunked` |
//!
//! More than one item for a `(source_id, type)` pair is repaired first:
//! the most recently created item survives.

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chunk::{chunk_document, chunk_source_prefix, parse_chunk_source_id};
use crate::models::{IndexItem, ItemContent, ItemType, ScopeFilter};
use crate::store::Store;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// A source business object rendered to its canonical text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: String,
    pub item_type: ItemType,
    pub data_source_id: Option<String>,
    pub content: String,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
    /// Excluded objects are kept out of the index.
    #[serde(default)]
    pub excluded: bool,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

/// Read-only view of the source business objects.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// `None` when the object no longer exists.
    async fn fetch(&self, source_id: &str, item_type: ItemType) -> Result<Option<SourceRecord>>;

    /// Every object owned by a data source, excluded ones included.
    async fn list_for_scope(&self, data_source_id: &str) -> Result<Vec<SourceRecord>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// What a single sync did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Created,
    ContentUpdated,
    MetadataUpdated,
    Deleted { removed: u64 },
    Chunked { chunks: usize },
}

/// Counters for a scope-wide sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub content_updated: usize,
    pub metadata_updated: usize,
    pub deleted: u64,
    pub documents_chunked: usize,
    pub chunks_written: usize,
    pub orphans_removed: u64,
}

impl SyncReport {
    pub fn record(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Created => self.created += 1,
            SyncOutcome::ContentUpdated => self.content_updated += 1,
            SyncOutcome::MetadataUpdated => self.metadata_updated += 1,
            SyncOutcome::Deleted { removed } => self.deleted += removed,
            SyncOutcome::Chunked { chunks } => {
                self.documents_chunked += 1;
                self.chunks_written += chunks;
            }
        }
    }
}

/// Re-read one source object and bring its item(s) up to date.
pub async fn sync_item(
    store: &dyn Store,
    catalog: &dyn SourceCatalog,
    source_id: &str,
    item_type: ItemType,
    chunking: ChunkingParams,
) -> Result<SyncOutcome> {
    let record = catalog
        .fetch(source_id, item_type)
        .await
        .with_context(|| format!("Failed to fetch {} source {}", item_type, source_id))?;

    match record {
        Some(rec) if !rec.excluded => upsert_record(store, &rec, chunking).await,
        _ => {
            let removed = remove_source(store, source_id, item_type).await?;
            debug!(source_id, %item_type, removed, "source gone or excluded");
            Ok(SyncOutcome::Deleted { removed })
        }
    }
}

/// Upsert every record of a data source and delete orphaned items.
pub async fn sync_all_for_scope(
    store: &dyn Store,
    catalog: &dyn SourceCatalog,
    data_source_id: &str,
    chunking: ChunkingParams,
) -> Result<SyncReport> {
    let records = catalog
        .list_for_scope(data_source_id)
        .await
        .with_context(|| format!("Failed to list sources for data source {}", data_source_id))?;

    let mut report = SyncReport::default();
    let mut live: HashSet<(ItemType, String)> = HashSet::new();

    for rec in records.iter().filter(|r| !r.excluded) {
        let outcome = upsert_record(store, rec, chunking)
            .await
            .with_context(|| format!("Failed to sync {} {}", rec.item_type, rec.source_id))?;
        report.record(&outcome);
        live.insert((rec.item_type, rec.source_id.clone()));
    }

    let scope = ScopeFilter::for_data_source(data_source_id).strict();
    for item in store.list_items(&scope, false).await? {
        let owner = match item.item_type {
            ItemType::Document => parse_chunk_source_id(&item.source_id)
                .map(|(doc, _)| doc)
                .unwrap_or(item.source_id.as_str()),
            _ => item.source_id.as_str(),
        };
        if !live.contains(&(item.item_type, owner.to_string())) && store.delete_item(&item.id).await? {
            report.orphans_removed += 1;
        }
    }

    info!(
        data_source_id,
        created = report.created,
        updated = report.content_updated,
        chunks = report.chunks_written,
        orphans = report.orphans_removed,
        "scope sync complete"
    );
    Ok(report)
}

/// Write one live record into the store.
pub async fn upsert_record(
    store: &dyn Store,
    rec: &SourceRecord,
    chunking: ChunkingParams,
) -> Result<SyncOutcome> {
    if rec.item_type == ItemType::Document {
        return sync_document(store, rec, chunking).await;
    }

    let content = ItemContent::from_text(rec.content.as_str());
    let Some(existing) = repair_duplicates(store, &rec.source_id, rec.item_type).await? else {
        let item = IndexItem::new(
            rec.item_type,
            rec.source_id.as_str(),
            rec.data_source_id.clone(),
            content,
            rec.metadata.clone(),
        );
        store.insert_item(&item).await?;
        return Ok(SyncOutcome::Created);
    };

    follow_data_source(store, &existing, rec).await?;
    if existing.content_hash() == content.content_hash() {
        store.update_metadata(&existing.id, &rec.metadata).await?;
        Ok(SyncOutcome::MetadataUpdated)
    } else {
        store.update_content(&existing.id, &content, &rec.metadata).await?;
        Ok(SyncOutcome::ContentUpdated)
    }
}

/// Move an item when its source object changed data source.
async fn follow_data_source(store: &dyn Store, item: &IndexItem, rec: &SourceRecord) -> Result<()> {
    if item.data_source_id != rec.data_source_id {
        debug!(
            source_id = %rec.source_id,
            from = ?item.data_source_id,
            to = ?rec.data_source_id,
            "item moved to another data source"
        );
        store.set_data_source(&item.id, rec.data_source_id.as_deref()).await?;
    }
    Ok(())
}

/// Delete the item(s) for a source, chunks included. Idempotent.
pub async fn remove_source(store: &dyn Store, source_id: &str, item_type: ItemType) -> Result<u64> {
    let mut removed = store.delete_by_source(source_id, item_type).await?;
    if item_type == ItemType::Document {
        for chunk in find_chunks(store, source_id).await? {
            if store.delete_item(&chunk.id).await? {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Chunks of exactly `document_id`. A prefix match alone would also return
/// chunks of a document whose id starts with `<document_id>_chunk_`.
async fn find_chunks(store: &dyn Store, document_id: &str) -> Result<Vec<IndexItem>> {
    let found = store
        .find_by_source_prefix(&chunk_source_prefix(document_id), ItemType::Document)
        .await?;
    Ok(found
        .into_iter()
        .filter(|item| {
            parse_chunk_source_id(&item.source_id).map(|(doc, _)| doc) == Some(document_id)
        })
        .collect())
}

/// Keep the newest item for the pair and delete the rest.
async fn repair_duplicates(
    store: &dyn Store,
    source_id: &str,
    item_type: ItemType,
) -> Result<Option<IndexItem>> {
    let mut found = store.find_by_source(source_id, item_type).await?;
    found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

    let mut found = found.into_iter();
    let keep = found.next();
    for dup in found {
        warn!(source_id, %item_type, id = %dup.id, "removing duplicate item");
        store.delete_item(&dup.id).await?;
    }
    Ok(keep)
}

/// Chunk a document into one item per window.
///
/// Unchanged documents (same hash, same window layout) only get their
/// metadata refreshed so their chunk embeddings survive.
async fn sync_document(
    store: &dyn Store,
    rec: &SourceRecord,
    chunking: ChunkingParams,
) -> Result<SyncOutcome> {
    let doc_hash = ItemContent::from_text(rec.content.as_str()).content_hash().to_string();
    let existing = find_chunks(store, &rec.source_id).await?;
    let chunks = chunk_document(&rec.source_id, &rec.content, chunking.chunk_size, chunking.chunk_overlap);

    let unchanged = !existing.is_empty()
        && existing.len() == chunks.len()
        && existing.iter().all(|item| {
            item.metadata.get("document_hash").and_then(|v| v.as_str()) == Some(doc_hash.as_str())
                && item.metadata.get("chunk_size").and_then(|v| v.as_u64())
                    == Some(chunking.chunk_size as u64)
                && item.metadata.get("chunk_overlap").and_then(|v| v.as_u64())
                    == Some(chunking.chunk_overlap as u64)
        });

    if unchanged {
        for item in &existing {
            follow_data_source(store, item, rec).await?;
            let index = parse_chunk_source_id(&item.source_id).map(|(_, i)| i).unwrap_or(0);
            store
                .update_metadata(&item.id, &chunk_metadata(rec, &doc_hash, index, chunking))
                .await?;
        }
        return Ok(SyncOutcome::MetadataUpdated);
    }

    // A document synced before chunking existed may still have a whole-text item.
    store.delete_by_source(&rec.source_id, ItemType::Document).await?;
    let mut dropped = 0u64;
    for item in &existing {
        if store.delete_item(&item.id).await? {
            dropped += 1;
        }
    }

    for chunk in &chunks {
        let item = IndexItem::new(
            ItemType::Document,
            chunk.source_id.as_str(),
            rec.data_source_id.clone(),
            ItemContent::from_text(chunk.text.as_str()),
            chunk_metadata(rec, &doc_hash, chunk.index, chunking),
        );
        store.insert_item(&item).await?;
    }

    debug!(document = %rec.source_id, dropped, written = chunks.len(), "document re-chunked");
    Ok(SyncOutcome::Chunked { chunks: chunks.len() })
}

fn chunk_metadata(
    rec: &SourceRecord,
    doc_hash: &str,
    index: usize,
    chunking: ChunkingParams,
) -> serde_json::Value {
    let mut meta = match &rec.metadata {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    meta.insert("document_id".into(), rec.source_id.clone().into());
    meta.insert("document_hash".into(), doc_hash.into());
    meta.insert("chunk_index".into(), index.into());
    meta.insert("chunk_size".into(), chunking.chunk_size.into());
    meta.insert("chunk_overlap".into(), chunking.chunk_overlap.into());
    serde_json::Value::Object(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use chrono::Duration;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCatalog {
        records: Mutex<HashMap<(ItemType, String), SourceRecord>>,
    }

    impl FakeCatalog {
        fn put(&self, rec: SourceRecord) {
            self.records
                .lock()
                .unwrap()
                .insert((rec.item_type, rec.source_id.clone()), rec);
        }

        fn remove(&self, source_id: &str, item_type: ItemType) {
            self.records
                .lock()
                .unwrap()
                .remove(&(item_type, source_id.to_string()));
        }
    }

    #[async_trait]
    impl SourceCatalog for FakeCatalog {
        async fn fetch(&self, source_id: &str, item_type: ItemType) -> Result<Option<SourceRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&(item_type, source_id.to_string()))
                .cloned())
        }

        async fn list_for_scope(&self, data_source_id: &str) -> Result<Vec<SourceRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.data_source_id.as_deref() == Some(data_source_id))
                .cloned()
                .collect())
        }
    }

    fn record(source_id: &str, item_type: ItemType, content: &str) -> SourceRecord {
        SourceRecord {
            source_id: source_id.into(),
            item_type,
            data_source_id: Some("ds1".into()),
            content: content.into(),
            metadata: json!({"name": source_id}),
            excluded: false,
        }
    }

    fn small_chunks() -> ChunkingParams {
        ChunkingParams {
            chunk_size: 4,
            chunk_overlap: 2,
        }
    }

    #[tokio::test]
    async fn test_create_then_metadata_only_update() {
        let store = InMemoryStore::new();
        let catalog = FakeCatalog::default();
        catalog.put(record("t1", ItemType::Table, "Table: users"));

        let first = sync_item(&store, &catalog, "t1", ItemType::Table, ChunkingParams::default())
            .await
            .unwrap();
        assert_eq!(first, SyncOutcome::Created);

        let mut rec = record("t1", ItemType::Table, "Table: users");
        rec.metadata = json!({"name": "t1", "owner": "ops"});
        catalog.put(rec);
        let second = sync_item(&store, &catalog, "t1", ItemType::Table, ChunkingParams::default())
            .await
            .unwrap();
        assert_eq!(second, SyncOutcome::MetadataUpdated);

        let items = store.find_by_source("t1", ItemType::Table).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].metadata["owner"], "ops");
    }

    #[tokio::test]
    async fn test_content_change_marks_stale() {
        let store = InMemoryStore::new();
        let catalog = FakeCatalog::default();
        catalog.put(record("q1", ItemType::SampleQuery, "find users"));
        sync_item(&store, &catalog, "q1", ItemType::SampleQuery, ChunkingParams::default())
            .await
            .unwrap();

        let item = store.find_by_source("q1", ItemType::SampleQuery).await.unwrap().remove(0);
        assert!(store
            .set_embedding(&item.id, &[0.1, 0.2], "m", item.content_hash())
            .await
            .unwrap());
        let embedded = store.get_item(&item.id).await.unwrap().unwrap();
        assert!(embedded.last_embedded_at.is_some());

        catalog.put(record("q1", ItemType::SampleQuery, "find inactive users"));
        let outcome = sync_item(&store, &catalog, "q1", ItemType::SampleQuery, ChunkingParams::default())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::ContentUpdated);

        let updated = store.get_item(&item.id).await.unwrap().unwrap();
        assert_eq!(updated.content(), "find inactive users");
        assert!(updated.last_embedded_at.is_none());
        assert!(updated.needs_embedding());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryStore::new();
        let catalog = FakeCatalog::default();
        catalog.put(record("c1", ItemType::Column, "Column: email"));
        sync_item(&store, &catalog, "c1", ItemType::Column, ChunkingParams::default())
            .await
            .unwrap();

        catalog.remove("c1", ItemType::Column);
        let first = sync_item(&store, &catalog, "c1", ItemType::Column, ChunkingParams::default())
            .await
            .unwrap();
        assert_eq!(first, SyncOutcome::Deleted { removed: 1 });

        let second = sync_item(&store, &catalog, "c1", ItemType::Column, ChunkingParams::default())
            .await
            .unwrap();
        assert_eq!(second, SyncOutcome::Deleted { removed: 0 });
    }

    #[tokio::test]
    async fn test_excluded_source_is_removed() {
        let store = InMemoryStore::new();
        let catalog = FakeCatalog::default();
        catalog.put(record("t1", ItemType::Table, "Table: audit"));
        sync_item(&store, &catalog, "t1", ItemType::Table, ChunkingParams::default())
            .await
            .unwrap();

        let mut rec = record("t1", ItemType::Table, "Table: audit");
        rec.excluded = true;
        catalog.put(rec);
        let outcome = sync_item(&store, &catalog, "t1", ItemType::Table, ChunkingParams::default())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Deleted { removed: 1 });
        assert!(store.find_by_source("t1", ItemType::Table).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_repair_keeps_newest() {
        let store = InMemoryStore::new();
        let catalog = FakeCatalog::default();

        let mut old = IndexItem::new(
            ItemType::Table,
            "t1",
            Some("ds1".into()),
            ItemContent::from_text("Table: users"),
            json!({}),
        );
        old.created_at = old.created_at - Duration::hours(1);
        let newer = IndexItem::new(
            ItemType::Table,
            "t1",
            Some("ds1".into()),
            ItemContent::from_text("Table: users"),
            json!({}),
        );
        store.insert_item(&old).await.unwrap();
        store.insert_item(&newer).await.unwrap();

        catalog.put(record("t1", ItemType::Table, "Table: users"));
        sync_item(&store, &catalog, "t1", ItemType::Table, ChunkingParams::default())
            .await
            .unwrap();

        let remaining = store.find_by_source("t1", ItemType::Table).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, newer.id);
    }

    #[tokio::test]
    async fn test_rechunking_replaces_prior_chunks() {
        let store = InMemoryStore::new();
        let catalog = FakeCatalog::default();
        catalog.put(record("doc", ItemType::Document, "abcdefghij"));

        let outcome = sync_item(&store, &catalog, "doc", ItemType::Document, small_chunks())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Chunked { chunks: 4 });

        let again = sync_item(&store, &catalog, "doc", ItemType::Document, small_chunks())
            .await
            .unwrap();
        assert_eq!(again, SyncOutcome::MetadataUpdated);

        catalog.put(record("doc", ItemType::Document, "abcdef"));
        let shrunk = sync_item(&store, &catalog, "doc", ItemType::Document, small_chunks())
            .await
            .unwrap();
        assert_eq!(shrunk, SyncOutcome::Chunked { chunks: 2 });

        let mut chunks = store
            .find_by_source_prefix("doc_chunk_", ItemType::Document)
            .await
            .unwrap();
        chunks.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        let ids: Vec<&str> = chunks.iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(ids, vec!["doc_chunk_0", "doc_chunk_1"]);
        assert_eq!(chunks[1].content(), "cdef");
        assert_eq!(chunks[0].metadata["document_id"], "doc");

        catalog.remove("doc", ItemType::Document);
        let gone = sync_item(&store, &catalog, "doc", ItemType::Document, small_chunks())
            .await
            .unwrap();
        assert_eq!(gone, SyncOutcome::Deleted { removed: 2 });
    }

    #[tokio::test]
    async fn test_data_source_change_moves_item() {
        let store = InMemoryStore::new();
        let catalog = FakeCatalog::default();
        catalog.put(record("t1", ItemType::Table, "Table: users"));
        catalog.put(record("doc", ItemType::Document, "abcdefghij"));
        sync_all_for_scope(&store, &catalog, "ds1", small_chunks())
            .await
            .unwrap();

        let mut moved = record("t1", ItemType::Table, "Table: users");
        moved.data_source_id = Some("ds2".into());
        catalog.put(moved);
        let mut moved_doc = record("doc", ItemType::Document, "abcdefghij");
        moved_doc.data_source_id = Some("ds2".into());
        catalog.put(moved_doc);

        let outcome = sync_item(&store, &catalog, "t1", ItemType::Table, small_chunks())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::MetadataUpdated);
        let doc_outcome = sync_item(&store, &catalog, "doc", ItemType::Document, small_chunks())
            .await
            .unwrap();
        assert_eq!(doc_outcome, SyncOutcome::MetadataUpdated);

        let table = store.find_by_source("t1", ItemType::Table).await.unwrap().remove(0);
        assert_eq!(table.data_source_id.as_deref(), Some("ds2"));
        let ds2 = ScopeFilter::for_data_source("ds2").strict();
        assert_eq!(store.list_items(&ds2, true).await.unwrap().len(), 5);

        // The old data source no longer owns them, so its scope sync keeps them.
        let report = sync_all_for_scope(&store, &catalog, "ds1", small_chunks())
            .await
            .unwrap();
        assert_eq!(report.orphans_removed, 0);
        assert_eq!(store.list_items(&ScopeFilter::all(), false).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_chunk_prefix_does_not_reach_other_documents() {
        let store = InMemoryStore::new();
        let catalog = FakeCatalog::default();
        catalog.put(record("a", ItemType::Document, "abcdefgh"));
        catalog.put(record("a_chunk_b", ItemType::Document, "abcdefgh"));
        for id in ["a", "a_chunk_b"] {
            sync_item(&store, &catalog, id, ItemType::Document, small_chunks())
                .await
                .unwrap();
        }

        catalog.put(record("a", ItemType::Document, "abcdef"));
        let outcome = sync_item(&store, &catalog, "a", ItemType::Document, small_chunks())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Chunked { chunks: 2 });

        catalog.remove("a", ItemType::Document);
        let gone = sync_item(&store, &catalog, "a", ItemType::Document, small_chunks())
            .await
            .unwrap();
        assert_eq!(gone, SyncOutcome::Deleted { removed: 2 });

        let other = store
            .find_by_source_prefix("a_chunk_b_chunk_", ItemType::Document)
            .await
            .unwrap();
        assert_eq!(other.len(), 3);
    }

    #[tokio::test]
    async fn test_scope_sync_removes_orphans() {
        let store = InMemoryStore::new();
        let catalog = FakeCatalog::default();
        catalog.put(record("t1", ItemType::Table, "Table: users"));
        catalog.put(record("t2", ItemType::Table, "Table: orders"));
        catalog.put(record("doc", ItemType::Document, "abcdefghij"));

        let report = sync_all_for_scope(&store, &catalog, "ds1", small_chunks())
            .await
            .unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.documents_chunked, 1);
        assert_eq!(report.chunks_written, 4);
        assert_eq!(report.orphans_removed, 0);

        catalog.remove("t2", ItemType::Table);
        let mut excluded = record("doc", ItemType::Document, "abcdefghij");
        excluded.excluded = true;
        catalog.put(excluded);

        let report = sync_all_for_scope(&store, &catalog, "ds1", small_chunks())
            .await
            .unwrap();
        assert_eq!(report.metadata_updated, 1);
        assert_eq!(report.orphans_removed, 5);

        let left = store.list_items(&ScopeFilter::all(), false).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].source_id, "t1");
    }
}
