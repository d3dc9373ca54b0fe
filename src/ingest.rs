//! `catsearch sync`: reconcile the index with the source catalog.
//!
//! Loads the JSON catalog from `[catalog] path`, then either syncs a single
//! source object or every object of one data source (removing orphans).
//! Newly written or changed items are left for `catsearch embed` to back-fill.

use anyhow::Result;

use catalog_search_core::models::ItemType;
use catalog_search_core::sync::{sync_all_for_scope, sync_item, SyncOutcome};

use crate::catalog::JsonCatalog;
use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn run_sync_item(config: &Config, item_type: ItemType, source_id: &str) -> Result<()> {
    let catalog = JsonCatalog::load(&config.catalog.path)?;
    let store = SqliteStore::open(config).await?;

    let outcome = sync_item(
        &store,
        &catalog,
        source_id,
        item_type,
        config.chunking.params(),
    )
    .await?;

    println!("sync {} {}", item_type, source_id);
    match outcome {
        SyncOutcome::Created => println!("  created"),
        SyncOutcome::ContentUpdated => println!("  content updated (embedding marked stale)"),
        SyncOutcome::MetadataUpdated => println!("  unchanged content, metadata refreshed"),
        SyncOutcome::Deleted { removed } => println!("  removed items: {}", removed),
        SyncOutcome::Chunked { chunks } => println!("  chunks written: {}", chunks),
    }
    println!("ok");

    store.pool().close().await;
    Ok(())
}

pub async fn run_sync_scope(config: &Config, data_source_id: &str) -> Result<()> {
    let catalog = JsonCatalog::load(&config.catalog.path)?;
    let store = SqliteStore::open(config).await?;

    let report = sync_all_for_scope(&store, &catalog, data_source_id, config.chunking.params()).await?;

    println!("sync scope {}", data_source_id);
    println!("  created: {}", report.created);
    println!("  content updated: {}", report.content_updated);
    println!("  metadata refreshed: {}", report.metadata_updated);
    println!("  documents chunked: {}", report.documents_chunked);
    println!("  chunks written: {}", report.chunks_written);
    println!("  orphans removed: {}", report.orphans_removed);
    println!("ok");

    store.pool().close().await;
    Ok(())
}
