//! Dense (embedding) retrieval with a hard timeout.
//!
//! The query is embedded by the configured provider and matched against
//! stored vectors via [`Store::vector_search`]. Any provider failure or a
//! provider call that outlives the timeout yields an empty candidate list
//! with `degraded = true`; the search as a whole never fails because of the
//! dense path.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use catalog_search_core::embedding::EmbeddingProvider;
use catalog_search_core::fusion::RankedHit;
use catalog_search_core::models::ScopeFilter;
use catalog_search_core::store::Store;
use catalog_search_core::EngineError;

/// Result of one dense retrieval.
#[derive(Debug, Clone, Default)]
pub struct DenseOutcome {
    /// Ranked by similarity descending, full precision.
    pub hits: Vec<RankedHit>,
    /// True when the dense signal was unavailable.
    pub degraded: bool,
}

impl DenseOutcome {
    fn degraded() -> Self {
        Self {
            hits: Vec::new(),
            degraded: true,
        }
    }
}

pub struct DenseRetriever {
    provider: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl DenseRetriever {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed `query` and return the top `limit` items in scope.
    ///
    /// The timeout covers the provider call only; the vector lookup is local.
    pub async fn retrieve(
        &self,
        store: &dyn Store,
        query: &str,
        scope: &ScopeFilter,
        limit: usize,
    ) -> DenseOutcome {
        if self.provider.dims() == 0 {
            debug!("dense retrieval skipped: no embedding provider configured");
            return DenseOutcome::degraded();
        }

        let query_vec = match tokio::time::timeout(self.timeout, self.provider.embed(query)).await {
            Ok(Ok(v)) if !v.is_empty() => v,
            Ok(Ok(_)) => {
                warn!(model = self.provider.model_name(), "empty query embedding, dense path degraded");
                return DenseOutcome::degraded();
            }
            Ok(Err(e)) => {
                warn!(model = self.provider.model_name(), error = %e, "query embedding failed, dense path degraded");
                return DenseOutcome::degraded();
            }
            Err(_) => {
                let err = EngineError::Timeout(self.timeout);
                warn!(model = self.provider.model_name(), error = %err, "dense path degraded");
                return DenseOutcome::degraded();
            }
        };

        match store.vector_search(&query_vec, scope, limit).await {
            Ok(candidates) => DenseOutcome {
                hits: candidates
                    .into_iter()
                    .map(|c| RankedHit::new(c.item_id, c.similarity))
                    .collect(),
                degraded: false,
            },
            Err(e) => {
                warn!(error = %e, "vector search failed, dense path degraded");
                DenseOutcome::degraded()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use catalog_search_core::models::{IndexItem, ItemContent, ItemType};
    use catalog_search_core::store::memory::InMemoryStore;

    struct FixedProvider(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.0.len()
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            bail!("connection refused")
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        fn model_name(&self) -> &str {
            "slow"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![1.0, 0.0])
        }
    }

    async fn store_with_vectors() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (source, vec) in [("a", [1.0f32, 0.0]), ("b", [0.0, 1.0])] {
            let item = IndexItem::new(
                ItemType::Table,
                source,
                None,
                ItemContent::from_text(source),
                serde_json::json!({}),
            );
            store.insert_item(&item).await.unwrap();
            store
                .set_embedding(&item.id, &vec, "fixed", item.content_hash())
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_ranks_by_similarity() {
        let store = store_with_vectors().await;
        let retriever = DenseRetriever::new(Arc::new(FixedProvider(vec![0.9, 0.1])), Duration::from_secs(1));
        let out = retriever.retrieve(&store, "q", &ScopeFilter::all(), 10).await;
        assert!(!out.degraded);
        assert_eq!(out.hits.len(), 2);
        let first = store.get_item(&out.hits[0].item_id).await.unwrap().unwrap();
        assert_eq!(first.source_id, "a");
        assert!(out.hits[0].score > out.hits[1].score);
    }

    #[tokio::test]
    async fn test_provider_error_degrades() {
        let store = store_with_vectors().await;
        let retriever = DenseRetriever::new(Arc::new(FailingProvider), Duration::from_secs(1));
        let out = retriever.retrieve(&store, "q", &ScopeFilter::all(), 10).await;
        assert!(out.degraded);
        assert!(out.hits.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_degrades() {
        let store = store_with_vectors().await;
        let retriever = DenseRetriever::new(Arc::new(SlowProvider), Duration::from_millis(20));
        let out = retriever.retrieve(&store, "q", &ScopeFilter::all(), 10).await;
        assert!(out.degraded);
        assert!(out.hits.is_empty());
    }
}
