//! Batch (re-)embedding of items whose vectors are missing or stale.
//!
//! Selects pending items in scope, embeds them through the configured
//! provider with at most `max_concurrency` calls in flight, and stores each
//! vector only if the item's content hash is still the one that was
//! embedded. A single failing item never aborts the batch; failures are
//! collected into the returned [`BatchEmbedReport`].

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use catalog_search_core::embedding::EmbeddingProvider;
use catalog_search_core::models::ScopeFilter;
use catalog_search_core::store::Store;
use catalog_search_core::EngineError;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteStore;

/// Per-item failure in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct EmbedFailure {
    pub item_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchEmbedReport {
    /// Items selected for embedding.
    pub total: usize,
    pub succeeded: usize,
    /// Embedded, but the content changed meanwhile so the vector was discarded.
    pub skipped_stale: usize,
    pub failures: Vec<EmbedFailure>,
}

enum ItemResult {
    Stored,
    Stale,
}

/// Embed pending items in `scope`. With `force`, every active item in scope.
pub async fn batch_embed(
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
    scope: &ScopeFilter,
    force: bool,
    limit: Option<usize>,
    max_concurrency: usize,
) -> Result<BatchEmbedReport> {
    if provider.dims() == 0 {
        return Err(EngineError::Provider(
            "Embedding provider is disabled. Set [embedding] provider in config.".into(),
        )
        .into());
    }

    let pending = store.pending_embeddings(scope, force, limit).await?;
    let mut report = BatchEmbedReport {
        total: pending.len(),
        ..Default::default()
    };

    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut workers = JoinSet::new();

    for item in pending {
        let permit = Arc::clone(&semaphore).acquire_owned().await?;
        let store = Arc::clone(&store);
        let provider = Arc::clone(&provider);

        workers.spawn(async move {
            let _permit = permit;
            let result = async {
                let vector = provider.embed(item.content()).await?;
                if vector.len() != provider.dims() {
                    return Err(anyhow::Error::new(EngineError::Provider(format!(
                        "expected {} dimensions, got {}",
                        provider.dims(),
                        vector.len()
                    ))));
                }
                let applied = store
                    .set_embedding(&item.id, &vector, provider.model_name(), item.content_hash())
                    .await?;
                Ok::<_, anyhow::Error>(if applied {
                    ItemResult::Stored
                } else {
                    ItemResult::Stale
                })
            }
            .await;
            (item.id, result)
        });
    }

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((_, Ok(ItemResult::Stored))) => report.succeeded += 1,
            Ok((_, Ok(ItemResult::Stale))) => report.skipped_stale += 1,
            Ok((item_id, Err(e))) => {
                warn!(item_id = %item_id, error = %e, "embedding failed");
                report.failures.push(EmbedFailure {
                    item_id,
                    error: format!("{:#}", e),
                });
            }
            Err(e) => {
                warn!(error = %e, "embedding task aborted");
                report.failures.push(EmbedFailure {
                    item_id: String::new(),
                    error: e.to_string(),
                });
            }
        }
    }

    report.failures.sort_by(|a, b| a.item_id.cmp(&b.item_id));
    info!(
        total = report.total,
        succeeded = report.succeeded,
        stale = report.skipped_stale,
        failed = report.failures.len(),
        "batch embed complete"
    );
    Ok(report)
}

/// CLI entry point for `catsearch embed`.
pub async fn run_embed(
    config: &Config,
    scope: ScopeFilter,
    force: bool,
    limit: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let store = Arc::new(SqliteStore::open(config).await?);

    if dry_run {
        let pending = store.pending_embeddings(&scope, force, limit).await?;
        println!("embed (dry-run)");
        println!("  items needing embeddings: {}", pending.len());
        return Ok(());
    }

    let provider = create_provider(&config.embedding)?;
    let report = batch_embed(
        store.clone(),
        provider,
        &scope,
        force,
        limit,
        config.embedding.max_concurrency,
    )
    .await?;

    println!("embed{}", if force { " (force)" } else { "" });
    if report.total == 0 {
        println!("  all items up to date");
        return Ok(());
    }
    println!("  total pending: {}", report.total);
    println!("  embedded: {}", report.succeeded);
    println!("  skipped (content changed): {}", report.skipped_stale);
    println!("  failed: {}", report.failures.len());
    for f in report.failures.iter().take(10) {
        println!("    {}: {}", f.item_id, f.error);
    }

    store.pool().close().await;
    Ok(())
}
