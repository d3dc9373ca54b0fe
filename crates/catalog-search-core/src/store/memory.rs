//! In-memory [`Store`] implementation for tests and embedded use.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity over all stored vectors.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    IndexItem, ItemContent, ItemType, ScopeFilter, SearchLogEntry, SearchProfile,
};

use super::{rank_by_similarity, ItemCounts, Store, VectorCandidate};

/// In-memory store.
pub struct InMemoryStore {
    items: RwLock<HashMap<String, IndexItem>>,
    profiles: RwLock<Vec<SearchProfile>>,
    logs: RwLock<Vec<SearchLogEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            profiles: RwLock::new(Vec::new()),
            logs: RwLock::new(Vec::new()),
        }
    }

    fn read_items(&self) -> Result<RwLockReadGuard<'_, HashMap<String, IndexItem>>> {
        self.items.read().map_err(|_| anyhow!("item map lock poisoned"))
    }

    fn write_items(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, IndexItem>>> {
        self.items.write().map_err(|_| anyhow!("item map lock poisoned"))
    }

    fn sorted_newest_first(mut items: Vec<IndexItem>) -> Vec<IndexItem> {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        items
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_item(&self, item: &IndexItem) -> Result<()> {
        let mut items = self.write_items()?;
        if items.contains_key(&item.id) {
            anyhow::bail!("item {} already exists", item.id);
        }
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<IndexItem>> {
        Ok(self.read_items()?.get(id).cloned())
    }

    async fn find_by_source(&self, source_id: &str, item_type: ItemType) -> Result<Vec<IndexItem>> {
        let found = self
            .read_items()?
            .values()
            .filter(|i| i.source_id == source_id && i.item_type == item_type)
            .cloned()
            .collect();
        Ok(Self::sorted_newest_first(found))
    }

    async fn find_by_source_prefix(
        &self,
        prefix: &str,
        item_type: ItemType,
    ) -> Result<Vec<IndexItem>> {
        let mut found: Vec<IndexItem> = self
            .read_items()?
            .values()
            .filter(|i| i.item_type == item_type && i.source_id.starts_with(prefix))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(found)
    }

    async fn update_metadata(&self, id: &str, metadata: &serde_json::Value) -> Result<bool> {
        let mut items = self.write_items()?;
        Ok(match items.get_mut(id) {
            Some(item) => {
                item.metadata = metadata.clone();
                item.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn update_content(
        &self,
        id: &str,
        content: &ItemContent,
        metadata: &serde_json::Value,
    ) -> Result<bool> {
        let mut items = self.write_items()?;
        Ok(match items.get_mut(id) {
            Some(item) => {
                item.replace_content(content.clone());
                item.metadata = metadata.clone();
                true
            }
            None => false,
        })
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<bool> {
        let mut items = self.write_items()?;
        Ok(match items.get_mut(id) {
            Some(item) => {
                item.is_active = active;
                item.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_data_source(&self, id: &str, data_source_id: Option<&str>) -> Result<bool> {
        let mut items = self.write_items()?;
        Ok(match items.get_mut(id) {
            Some(item) => {
                item.data_source_id = data_source_id.map(String::from);
                item.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_embedding(
        &self,
        id: &str,
        vector: &[f32],
        model: &str,
        expected_hash: &str,
    ) -> Result<bool> {
        let mut items = self.write_items()?;
        Ok(match items.get_mut(id) {
            Some(item) if item.content_hash() == expected_hash => {
                item.embedding = Some(vector.to_vec());
                item.embedding_model = Some(model.to_string());
                item.last_embedded_at = Some(Utc::now());
                true
            }
            _ => false,
        })
    }

    async fn delete_item(&self, id: &str) -> Result<bool> {
        Ok(self.write_items()?.remove(id).is_some())
    }

    async fn delete_by_source(&self, source_id: &str, item_type: ItemType) -> Result<u64> {
        let mut items = self.write_items()?;
        let before = items.len();
        items.retain(|_, i| !(i.source_id == source_id && i.item_type == item_type));
        Ok((before - items.len()) as u64)
    }

    async fn list_items(&self, scope: &ScopeFilter, active_only: bool) -> Result<Vec<IndexItem>> {
        let mut found: Vec<IndexItem> = self
            .read_items()?
            .values()
            .filter(|i| (!active_only || i.is_active) && scope.matches(i))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn pending_embeddings(
        &self,
        scope: &ScopeFilter,
        force: bool,
        limit: Option<usize>,
    ) -> Result<Vec<IndexItem>> {
        let mut found: Vec<IndexItem> = self
            .read_items()?
            .values()
            .filter(|i| i.is_active && scope.matches(i) && (force || i.needs_embedding()))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        scope: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<VectorCandidate>> {
        let items = self.read_items()?;
        let vectors = items.values().filter_map(|i| {
            if !i.is_active || !scope.matches(i) {
                return None;
            }
            i.embedding.as_deref().map(|v| (i.id.as_str(), v))
        });
        Ok(rank_by_similarity(query_vec, vectors, limit))
    }

    async fn get_profile(&self, name: &str) -> Result<Option<SearchProfile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| anyhow!("profile lock poisoned"))?;
        Ok(profiles.iter().find(|p| p.name == name).cloned())
    }

    async fn get_scope_default_profile(
        &self,
        data_source_id: &str,
    ) -> Result<Option<SearchProfile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| anyhow!("profile lock poisoned"))?;
        Ok(profiles
            .iter()
            .find(|p| p.is_default && p.data_source_id.as_deref() == Some(data_source_id))
            .cloned())
    }

    async fn upsert_profile(&self, profile: &SearchProfile) -> Result<()> {
        let mut profiles = self
            .profiles
            .write()
            .map_err(|_| anyhow!("profile lock poisoned"))?;
        if profile.is_default {
            for p in profiles.iter_mut() {
                if p.data_source_id == profile.data_source_id {
                    p.is_default = false;
                }
            }
        }
        match profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile.clone(),
            None => profiles.push(profile.clone()),
        }
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<SearchProfile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| anyhow!("profile lock poisoned"))?;
        let mut all = profiles.clone();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn append_search_log(&self, entry: &SearchLogEntry) -> Result<()> {
        self.logs
            .write()
            .map_err(|_| anyhow!("search log lock poisoned"))?
            .push(entry.clone());
        Ok(())
    }

    async fn recent_search_logs(&self, limit: usize) -> Result<Vec<SearchLogEntry>> {
        let logs = self
            .logs
            .read()
            .map_err(|_| anyhow!("search log lock poisoned"))?;
        Ok(logs.iter().rev().take(limit).cloned().collect())
    }

    async fn count_items(&self, scope: &ScopeFilter) -> Result<ItemCounts> {
        let items = self.read_items()?;
        let mut counts = ItemCounts::default();
        for item in items.values().filter(|i| scope.matches(i)) {
            counts.total += 1;
            if item.is_active {
                counts.active += 1;
            }
            if item.embedding.is_some() {
                counts.embedded += 1;
                if item.last_embedded_at.is_none() {
                    counts.stale += 1;
                }
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_item(source_id: &str, text: &str) -> IndexItem {
        IndexItem::new(
            ItemType::Table,
            source_id,
            Some("ds1".to_string()),
            ItemContent::from_text(text),
            json!({}),
        )
    }

    #[tokio::test]
    async fn test_update_content_clears_last_embedded_at() {
        let store = InMemoryStore::new();
        let item = new_item("t1", "users table");
        store.insert_item(&item).await.unwrap();
        assert!(store
            .set_embedding(&item.id, &[1.0, 0.0], "m", item.content_hash())
            .await
            .unwrap());
        assert!(store.get_item(&item.id).await.unwrap().unwrap().last_embedded_at.is_some());

        let new_content = ItemContent::from_text("users table with email");
        store
            .update_content(&item.id, &new_content, &json!({"v": 2}))
            .await
            .unwrap();

        let loaded = store.get_item(&item.id).await.unwrap().unwrap();
        assert!(loaded.last_embedded_at.is_none());
        assert_eq!(loaded.content_hash(), new_content.content_hash());
        assert_eq!(loaded.token_count(), loaded.tokens().len());
        assert_eq!(loaded.metadata, json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_set_embedding_rejects_stale_hash() {
        let store = InMemoryStore::new();
        let item = new_item("t1", "users table");
        store.insert_item(&item).await.unwrap();
        let old_hash = item.content_hash().to_string();
        store
            .update_content(&item.id, &ItemContent::from_text("changed"), &json!({}))
            .await
            .unwrap();

        let applied = store.set_embedding(&item.id, &[1.0], "m", &old_hash).await.unwrap();
        assert!(!applied);
        let loaded = store.get_item(&item.id).await.unwrap().unwrap();
        assert!(loaded.embedding.is_none());
        assert!(loaded.needs_embedding());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryStore::new();
        assert!(!store.delete_item("missing").await.unwrap());
        assert_eq!(store.delete_by_source("missing", ItemType::Table).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_vector_search_skips_inactive_and_unembedded() {
        let store = InMemoryStore::new();
        let a = new_item("a", "alpha");
        let b = new_item("b", "beta");
        let c = new_item("c", "gamma");
        for i in [&a, &b, &c] {
            store.insert_item(i).await.unwrap();
        }
        store.set_embedding(&a.id, &[1.0, 0.0], "m", a.content_hash()).await.unwrap();
        store.set_embedding(&b.id, &[0.9, 0.1], "m", b.content_hash()).await.unwrap();
        store.set_active(&b.id, false).await.unwrap();

        let hits = store
            .vector_search(&[1.0, 0.0], &ScopeFilter::all(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item_id, a.id);
    }

    #[tokio::test]
    async fn test_scope_default_profile_is_unique() {
        let store = InMemoryStore::new();
        let mut p1 = SearchProfile {
            name: "p1".into(),
            data_source_id: Some("ds1".into()),
            is_default: true,
            ..Default::default()
        };
        store.upsert_profile(&p1).await.unwrap();
        let p2 = SearchProfile {
            name: "p2".into(),
            data_source_id: Some("ds1".into()),
            is_default: true,
            top_k: Some(3),
            ..Default::default()
        };
        store.upsert_profile(&p2).await.unwrap();

        let default = store.get_scope_default_profile("ds1").await.unwrap().unwrap();
        assert_eq!(default.name, "p2");
        p1.is_default = false;
        assert_eq!(store.get_profile("p1").await.unwrap(), Some(p1));
    }

    #[tokio::test]
    async fn test_pending_embeddings() {
        let store = InMemoryStore::new();
        let a = new_item("a", "alpha");
        let b = new_item("b", "beta");
        store.insert_item(&a).await.unwrap();
        store.insert_item(&b).await.unwrap();
        store.set_embedding(&a.id, &[1.0], "m", a.content_hash()).await.unwrap();

        let pending = store.pending_embeddings(&ScopeFilter::all(), false, None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);

        let forced = store.pending_embeddings(&ScopeFilter::all(), true, None).await.unwrap();
        assert_eq!(forced.len(), 2);
    }
}
