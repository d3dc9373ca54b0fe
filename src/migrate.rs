use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // (source_id, item_type) is not UNIQUE; sync repairs duplicates.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_items (
            id TEXT PRIMARY KEY,
            item_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            data_source_id TEXT,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            tokens_json TEXT NOT NULL DEFAULT '[]',
            token_count INTEGER NOT NULL DEFAULT 0,
            embedding BLOB,
            embedding_model TEXT,
            last_embedded_at INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-scope retrieval settings
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_profiles (
            name TEXT PRIMARY KEY,
            data_source_id TEXT,
            is_default INTEGER NOT NULL DEFAULT 0,
            top_k INTEGER,
            search_method TEXT,
            dense_weight REAL,
            sparse_weight REAL,
            rrf_k REAL,
            dimensions INTEGER,
            model TEXT,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Search telemetry
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_logs (
            id TEXT PRIMARY KEY,
            query TEXT NOT NULL,
            method TEXT NOT NULL,
            data_source_id TEXT,
            top_k INTEGER NOT NULL,
            result_count INTEGER NOT NULL,
            dense_ms INTEGER,
            sparse_ms INTEGER,
            fusion_ms INTEGER,
            total_ms INTEGER NOT NULL,
            dense_degraded INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_items_source ON index_items(source_id, item_type)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_items_scope ON index_items(data_source_id, item_type, is_active)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_profiles_scope ON search_profiles(data_source_id, is_default)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_search_logs_created_at ON search_logs(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
