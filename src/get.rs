//! Item retrieval by ID.
//!
//! Used by both the `catsearch get` CLI command and `GET /items/{id}`.

use anyhow::Result;
use serde::Serialize;

use catalog_search_core::models::{IndexItem, ItemType};
use catalog_search_core::store::Store;
use catalog_search_core::EngineError;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Public view of an item. The vector itself is summarized, not returned.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResponse {
    pub id: String,
    pub item_type: ItemType,
    pub source_id: String,
    pub data_source_id: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub token_count: usize,
    pub is_active: bool,
    pub embedding_model: Option<String>,
    pub embedding_dims: Option<usize>,
    pub last_embedded_at: Option<String>, // ISO8601
    pub needs_embedding: bool,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
    pub metadata: serde_json::Value,
}

impl From<IndexItem> for ItemResponse {
    fn from(item: IndexItem) -> Self {
        let needs_embedding = item.needs_embedding();
        Self {
            content: item.content().to_string(),
            content_hash: item.content_hash().to_string(),
            token_count: item.token_count(),
            embedding_dims: item.embedding.as_ref().map(Vec::len),
            last_embedded_at: item.last_embedded_at.map(|t| t.to_rfc3339()),
            created_at: item.created_at.to_rfc3339(),
            updated_at: item.updated_at.to_rfc3339(),
            id: item.id,
            item_type: item.item_type,
            source_id: item.source_id,
            data_source_id: item.data_source_id,
            is_active: item.is_active,
            embedding_model: item.embedding_model,
            needs_embedding,
            metadata: item.metadata,
        }
    }
}

/// Load one item; a missing id is an [`EngineError::NotFound`].
pub async fn get_item(store: &dyn Store, id: &str) -> Result<ItemResponse> {
    let item = store
        .get_item(id)
        .await?
        .ok_or_else(|| EngineError::not_found("item", id))?;
    Ok(item.into())
}

/// CLI entry point: calls get_item and prints to stdout.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let item = get_item(&store, id).await?;
    store.pool().close().await;

    println!("--- Item ---");
    println!("id:               {}", item.id);
    println!("type:             {}", item.item_type);
    println!("source_id:        {}", item.source_id);
    println!(
        "data_source_id:   {}",
        item.data_source_id.as_deref().unwrap_or("(global)")
    );
    println!("active:           {}", item.is_active);
    println!("tokens:           {}", item.token_count);
    println!("content_hash:     {}", item.content_hash);
    match (&item.embedding_model, item.embedding_dims) {
        (Some(model), Some(dims)) => println!("embedding:        {} ({} dims)", model, dims),
        _ => println!("embedding:        (none)"),
    }
    println!(
        "last_embedded_at: {}",
        item.last_embedded_at.as_deref().unwrap_or("(stale)")
    );
    println!("created_at:       {}", item.created_at);
    println!("updated_at:       {}", item.updated_at);
    println!("metadata:         {}", item.metadata);
    println!();

    println!("--- Content ---");
    println!("{}", item.content);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_search_core::models::ItemContent;
    use catalog_search_core::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = InMemoryStore::new();
        let err = get_item(&store, "nope").await.unwrap_err();
        assert!(EngineError::is_not_found(&err));
    }

    #[tokio::test]
    async fn test_get_reports_embedding_state() {
        let store = InMemoryStore::new();
        let item = IndexItem::new(
            ItemType::SampleQuery,
            "q1",
            None,
            ItemContent::from_text("find inactive users"),
            serde_json::json!({}),
        );
        store.insert_item(&item).await.unwrap();

        let resp = get_item(&store, &item.id).await.unwrap();
        assert!(resp.needs_embedding);
        assert_eq!(resp.embedding_dims, None);
        assert_eq!(resp.token_count, 3);
    }
}
