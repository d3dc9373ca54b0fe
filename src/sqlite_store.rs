//! SQLite-backed [`Store`] implementation.
//!
//! Items, profiles, and search logs live in the tables created by
//! [`crate::migrate`]. Timestamps are stored as Unix milliseconds; vectors as
//! little-endian `f32` BLOBs. Vector search decodes the scoped vectors and
//! ranks them in-process.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use catalog_search_core::embedding::{blob_to_vec, vec_to_blob};
use catalog_search_core::models::{
    IndexItem, ItemContent, ItemType, ScopeFilter, SearchLogEntry, SearchProfile,
};
use catalog_search_core::store::{rank_by_similarity, ItemCounts, Store, VectorCandidate};

use crate::config::Config;
use crate::db;

const ITEM_COLUMNS: &str = "id, item_type, source_id, data_source_id, content, content_hash, \
     tokens_json, embedding, embedding_model, last_embedded_at, is_active, metadata_json, \
     created_at, updated_at";

const PROFILE_COLUMNS: &str = "name, data_source_id, is_default, top_k, search_method, \
     dense_weight, sparse_weight, rrf_k, dimensions, model";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database. Run `catsearch init` first.
    pub async fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(db::connect(config).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_items(&self, mut qb: QueryBuilder<'_, Sqlite>) -> Result<Vec<IndexItem>> {
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_item).collect()
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_item(row: &SqliteRow) -> Result<IndexItem> {
    let item_type: String = row.try_get("item_type")?;
    let tokens_json: String = row.try_get("tokens_json")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
    let last_embedded_at: Option<i64> = row.try_get("last_embedded_at")?;
    let is_active: i64 = row.try_get("is_active")?;

    let tokens: Vec<String> = serde_json::from_str(&tokens_json).unwrap_or_default();
    let body = ItemContent::from_stored(
        row.try_get("content")?,
        row.try_get("content_hash")?,
        tokens,
    );

    Ok(IndexItem {
        id: row.try_get("id")?,
        item_type: item_type.parse()?,
        source_id: row.try_get("source_id")?,
        data_source_id: row.try_get("data_source_id")?,
        body,
        embedding: embedding.as_deref().map(blob_to_vec),
        embedding_model: row.try_get("embedding_model")?,
        last_embedded_at: last_embedded_at.map(from_millis),
        is_active: is_active != 0,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

fn row_to_profile(row: &SqliteRow) -> Result<SearchProfile> {
    let method: Option<String> = row.try_get("search_method")?;
    let top_k: Option<i64> = row.try_get("top_k")?;
    let dimensions: Option<i64> = row.try_get("dimensions")?;
    let is_default: i64 = row.try_get("is_default")?;

    Ok(SearchProfile {
        name: row.try_get("name")?,
        data_source_id: row.try_get("data_source_id")?,
        is_default: is_default != 0,
        top_k: top_k.map(|v| v as usize),
        search_method: method.map(|m| m.parse()).transpose()?,
        dense_weight: row.try_get("dense_weight")?,
        sparse_weight: row.try_get("sparse_weight")?,
        rrf_k: row.try_get("rrf_k")?,
        dimensions: dimensions.map(|v| v as usize),
        model: row.try_get("model")?,
    })
}

/// Append ` AND ...` clauses for a scope filter.
fn push_scope(qb: &mut QueryBuilder<'_, Sqlite>, scope: &ScopeFilter) {
    if !scope.item_types.is_empty() {
        qb.push(" AND item_type IN (");
        let mut types = qb.separated(", ");
        for t in &scope.item_types {
            types.push_bind(t.as_str());
        }
        types.push_unseparated(")");
    }
    if let Some(ds) = &scope.data_source_id {
        if scope.include_global {
            qb.push(" AND (data_source_id = ")
                .push_bind(ds.clone())
                .push(" OR data_source_id IS NULL)");
        } else {
            qb.push(" AND data_source_id = ").push_bind(ds.clone());
        }
    }
}

fn select_items(where_clause: &str) -> QueryBuilder<'static, Sqlite> {
    QueryBuilder::new(format!(
        "SELECT {} FROM index_items WHERE {}",
        ITEM_COLUMNS, where_clause
    ))
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_item(&self, item: &IndexItem) -> Result<()> {
        let tokens_json = serde_json::to_string(item.tokens())?;
        let metadata_json = serde_json::to_string(&item.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO index_items (id, item_type, source_id, data_source_id, content,
                                     content_hash, tokens_json, token_count, embedding,
                                     embedding_model, last_embedded_at, is_active,
                                     metadata_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(item.item_type.as_str())
        .bind(&item.source_id)
        .bind(&item.data_source_id)
        .bind(item.content())
        .bind(item.content_hash())
        .bind(tokens_json)
        .bind(item.token_count() as i64)
        .bind(item.embedding.as_deref().map(vec_to_blob))
        .bind(&item.embedding_model)
        .bind(item.last_embedded_at.map(to_millis))
        .bind(item.is_active as i64)
        .bind(metadata_json)
        .bind(to_millis(item.created_at))
        .bind(to_millis(item.updated_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert item {}", item.id))?;

        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<IndexItem>> {
        let mut qb = select_items("id = ");
        qb.push_bind(id.to_string());
        Ok(self.fetch_items(qb).await?.into_iter().next())
    }

    async fn find_by_source(&self, source_id: &str, item_type: ItemType) -> Result<Vec<IndexItem>> {
        let mut qb = select_items("source_id = ");
        qb.push_bind(source_id.to_string())
            .push(" AND item_type = ")
            .push_bind(item_type.as_str())
            .push(" ORDER BY created_at DESC, id DESC");
        self.fetch_items(qb).await
    }

    async fn find_by_source_prefix(
        &self,
        prefix: &str,
        item_type: ItemType,
    ) -> Result<Vec<IndexItem>> {
        // substr() instead of LIKE so '_' and '%' in ids match literally.
        let mut qb = select_items("item_type = ");
        qb.push_bind(item_type.as_str())
            .push(" AND substr(source_id, 1, ")
            .push_bind(prefix.chars().count() as i64)
            .push(") = ")
            .push_bind(prefix.to_string())
            .push(" ORDER BY source_id ASC");
        self.fetch_items(qb).await
    }

    async fn update_metadata(&self, id: &str, metadata: &serde_json::Value) -> Result<bool> {
        let result =
            sqlx::query("UPDATE index_items SET metadata_json = ?, updated_at = ? WHERE id = ?")
                .bind(serde_json::to_string(metadata)?)
                .bind(to_millis(Utc::now()))
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_content(
        &self,
        id: &str,
        content: &ItemContent,
        metadata: &serde_json::Value,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE index_items SET
                content = ?,
                content_hash = ?,
                tokens_json = ?,
                token_count = ?,
                metadata_json = ?,
                last_embedded_at = NULL,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(content.content())
        .bind(content.content_hash())
        .bind(serde_json::to_string(content.tokens())?)
        .bind(content.token_count() as i64)
        .bind(serde_json::to_string(metadata)?)
        .bind(to_millis(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE index_items SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active as i64)
            .bind(to_millis(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_data_source(&self, id: &str, data_source_id: Option<&str>) -> Result<bool> {
        let result =
            sqlx::query("UPDATE index_items SET data_source_id = ?, updated_at = ? WHERE id = ?")
                .bind(data_source_id)
                .bind(to_millis(Utc::now()))
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_embedding(
        &self,
        id: &str,
        vector: &[f32],
        model: &str,
        expected_hash: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE index_items SET
                embedding = ?,
                embedding_model = ?,
                last_embedded_at = ?
            WHERE id = ? AND content_hash = ?
            "#,
        )
        .bind(vec_to_blob(vector))
        .bind(model)
        .bind(to_millis(Utc::now()))
        .bind(id)
        .bind(expected_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_item(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM index_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_source(&self, source_id: &str, item_type: ItemType) -> Result<u64> {
        let result = sqlx::query("DELETE FROM index_items WHERE source_id = ? AND item_type = ?")
            .bind(source_id)
            .bind(item_type.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_items(&self, scope: &ScopeFilter, active_only: bool) -> Result<Vec<IndexItem>> {
        let mut qb = select_items("1 = 1");
        if active_only {
            qb.push(" AND is_active = 1");
        }
        push_scope(&mut qb, scope);
        qb.push(" ORDER BY created_at ASC, id ASC");
        self.fetch_items(qb).await
    }

    async fn pending_embeddings(
        &self,
        scope: &ScopeFilter,
        force: bool,
        limit: Option<usize>,
    ) -> Result<Vec<IndexItem>> {
        let mut qb = select_items("is_active = 1");
        if !force {
            qb.push(" AND (embedding IS NULL OR last_embedded_at IS NULL)");
        }
        push_scope(&mut qb, scope);
        qb.push(" ORDER BY created_at ASC, id ASC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        self.fetch_items(qb).await
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        scope: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<VectorCandidate>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, embedding FROM index_items WHERE is_active = 1 AND embedding IS NOT NULL",
        );
        push_scope(&mut qb, scope);
        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut decoded: Vec<(String, Vec<f32>)> = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            decoded.push((row.try_get("id")?, blob_to_vec(&blob)));
        }

        Ok(rank_by_similarity(
            query_vec,
            decoded.iter().map(|(id, v)| (id.as_str(), v.as_slice())),
            limit,
        ))
    }

    async fn get_profile(&self, name: &str) -> Result<Option<SearchProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM search_profiles WHERE name = ?",
            PROFILE_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_profile).transpose()
    }

    async fn get_scope_default_profile(
        &self,
        data_source_id: &str,
    ) -> Result<Option<SearchProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM search_profiles WHERE data_source_id = ? AND is_default = 1 \
             ORDER BY updated_at DESC LIMIT 1",
            PROFILE_COLUMNS
        ))
        .bind(data_source_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_profile).transpose()
    }

    async fn upsert_profile(&self, profile: &SearchProfile) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if profile.is_default {
            sqlx::query(
                "UPDATE search_profiles SET is_default = 0 WHERE data_source_id IS ? AND name != ?",
            )
            .bind(&profile.data_source_id)
            .bind(&profile.name)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO search_profiles (name, data_source_id, is_default, top_k, search_method,
                                         dense_weight, sparse_weight, rrf_k, dimensions, model,
                                         updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                data_source_id = excluded.data_source_id,
                is_default = excluded.is_default,
                top_k = excluded.top_k,
                search_method = excluded.search_method,
                dense_weight = excluded.dense_weight,
                sparse_weight = excluded.sparse_weight,
                rrf_k = excluded.rrf_k,
                dimensions = excluded.dimensions,
                model = excluded.model,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&profile.name)
        .bind(&profile.data_source_id)
        .bind(profile.is_default as i64)
        .bind(profile.top_k.map(|v| v as i64))
        .bind(profile.search_method.map(|m| m.as_str()))
        .bind(profile.dense_weight)
        .bind(profile.sparse_weight)
        .bind(profile.rrf_k)
        .bind(profile.dimensions.map(|v| v as i64))
        .bind(&profile.model)
        .bind(to_millis(Utc::now()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<SearchProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM search_profiles ORDER BY name ASC",
            PROFILE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_profile).collect()
    }

    async fn append_search_log(&self, entry: &SearchLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO search_logs (id, query, method, data_source_id, top_k, result_count,
                                     dense_ms, sparse_ms, fusion_ms, total_ms, dense_degraded,
                                     created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.query)
        .bind(&entry.method)
        .bind(&entry.data_source_id)
        .bind(entry.top_k as i64)
        .bind(entry.result_count as i64)
        .bind(entry.dense_ms.map(|v| v as i64))
        .bind(entry.sparse_ms.map(|v| v as i64))
        .bind(entry.fusion_ms.map(|v| v as i64))
        .bind(entry.total_ms as i64)
        .bind(entry.dense_degraded as i64)
        .bind(to_millis(entry.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_search_logs(&self, limit: usize) -> Result<Vec<SearchLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, query, method, data_source_id, top_k, result_count, dense_ms,
                   sparse_ms, fusion_ms, total_ms, dense_degraded, created_at
            FROM search_logs
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let opt_ms = |col: &str| -> Result<Option<u64>> {
                    let v: Option<i64> = row.try_get(col)?;
                    Ok(v.map(|v| v as u64))
                };
                let top_k: i64 = row.try_get("top_k")?;
                let result_count: i64 = row.try_get("result_count")?;
                let total_ms: i64 = row.try_get("total_ms")?;
                let degraded: i64 = row.try_get("dense_degraded")?;
                Ok(SearchLogEntry {
                    id: row.try_get("id")?,
                    query: row.try_get("query")?,
                    method: row.try_get("method")?,
                    data_source_id: row.try_get("data_source_id")?,
                    top_k: top_k as usize,
                    result_count: result_count as usize,
                    dense_ms: opt_ms("dense_ms")?,
                    sparse_ms: opt_ms("sparse_ms")?,
                    fusion_ms: opt_ms("fusion_ms")?,
                    total_ms: total_ms as u64,
                    dense_degraded: degraded != 0,
                    created_at: from_millis(row.try_get("created_at")?),
                })
            })
            .collect()
    }

    async fn count_items(&self, scope: &ScopeFilter) -> Result<ItemCounts> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(is_active), 0) AS active,
                   COALESCE(SUM(CASE WHEN embedding IS NOT NULL THEN 1 ELSE 0 END), 0) AS embedded,
                   COALESCE(SUM(CASE WHEN embedding IS NOT NULL AND last_embedded_at IS NULL
                                     THEN 1 ELSE 0 END), 0) AS stale
            FROM index_items WHERE 1 = 1
            "#,
        );
        push_scope(&mut qb, scope);
        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow!("count query returned no rows"))?;

        let get = |col: &str| -> Result<u64> {
            let v: i64 = row.try_get(col)?;
            Ok(v as u64)
        };
        Ok(ItemCounts {
            total: get("total")?,
            active: get("active")?,
            embedded: get("embedded")?,
            stale: get("stale")?,
        })
    }
}
