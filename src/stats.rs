//! Index statistics and health overview.
//!
//! Summarizes what's indexed: item counts per type, embedding coverage,
//! stale vectors awaiting re-embedding, and recent search activity. Used by
//! `catsearch stats` to confirm that syncs and embeddings are working.

use anyhow::Result;

use catalog_search_core::models::{ItemType, ScopeFilter};
use catalog_search_core::store::Store;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn run_stats(config: &Config, data_source_id: Option<String>) -> Result<()> {
    let store = SqliteStore::open(config).await?;

    let scope = match data_source_id {
        Some(ds) => ScopeFilter::for_data_source(ds).strict(),
        None => ScopeFilter::all(),
    };
    let totals = store.count_items(&scope).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Catalog Search Index Stats");
    println!("==========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    if let Some(ds) = &scope.data_source_id {
        println!("  Scope:       {}", ds);
    }
    println!();
    println!("  Items:       {} ({} active)", totals.total, totals.active);
    println!(
        "  Embedded:    {} / {} ({}%)",
        totals.embedded,
        totals.total,
        percent(totals.embedded, totals.total)
    );
    println!("  Stale:       {}", totals.stale);

    println!();
    println!("  By type:");
    println!(
        "  {:<14} {:>8} {:>8} {:>10} {:>7}",
        "TYPE", "ITEMS", "ACTIVE", "EMBEDDED", "STALE"
    );
    println!("  {}", "-".repeat(51));
    for item_type in ItemType::ALL {
        let counts = store
            .count_items(&scope.clone().with_types([item_type]))
            .await?;
        if counts.total == 0 {
            continue;
        }
        println!(
            "  {:<14} {:>8} {:>8} {:>10} {:>7}",
            item_type.as_str(),
            counts.total,
            counts.active,
            counts.embedded,
            counts.stale
        );
    }

    let logs = store.recent_search_logs(5).await?;
    if !logs.is_empty() {
        println!();
        println!("  Recent searches:");
        for log in &logs {
            println!(
                "  {}  {:<7} {:>3} results {:>5} ms{}  {}",
                log.created_at.format("%Y-%m-%d %H:%M"),
                log.method,
                log.result_count,
                log.total_ms,
                if log.dense_degraded { " (degraded)" } else { "" },
                log.query
            );
        }
    }

    println!();

    store.pool().close().await;
    Ok(())
}

fn percent(part: u64, whole: u64) -> u64 {
    if whole > 0 {
        (part * 100) / whole
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
