//! Core data models for the retrieval engine.
//!
//! An [`IndexItem`] is the unit of retrieval. It is derived from a source
//! business object (a table, a column, a curated sample query, a document
//! chunk) but does not own that object's lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::tokenize::{hash_content, tokenize};

/// Kind of source object an item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Table,
    Column,
    SampleQuery,
    Document,
    Custom,
}

impl ItemType {
    pub const ALL: [ItemType; 5] = [
        ItemType::Table,
        ItemType::Column,
        ItemType::SampleQuery,
        ItemType::Document,
        ItemType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Table => "TABLE",
            ItemType::Column => "COLUMN",
            ItemType::SampleQuery => "SAMPLE_QUERY",
            ItemType::Document => "DOCUMENT",
            ItemType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "TABLE" => Ok(ItemType::Table),
            "COLUMN" => Ok(ItemType::Column),
            "SAMPLE_QUERY" => Ok(ItemType::SampleQuery),
            "DOCUMENT" => Ok(ItemType::Document),
            "CUSTOM" => Ok(ItemType::Custom),
            other => Err(EngineError::InvalidInput(format!(
                "unknown item type '{}'. Use table, column, sample_query, document, or custom",
                other
            ))),
        }
    }
}

/// Text content of an item together with its derived fields.
///
/// The only constructor is [`ItemContent::from_text`], so the hash, token
/// cache, and token count are always computed from the same text at the
/// same time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemContent {
    content: String,
    content_hash: String,
    tokens: Vec<String>,
}

impl ItemContent {
    pub fn from_text(text: impl Into<String>) -> Self {
        let content = text.into();
        let content_hash = hash_content(&content);
        let tokens = tokenize(&content);
        Self {
            content,
            content_hash,
            tokens,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Rebuild from persisted columns.
    ///
    /// Stores call this when loading a row. If the stored hash no longer
    /// matches the text (a row edited outside the engine), the hash and
    /// tokens are recomputed rather than trusted.
    pub fn from_stored(content: String, content_hash: String, tokens: Vec<String>) -> Self {
        if hash_content(&content) != content_hash {
            return Self::from_text(content);
        }
        Self {
            content,
            content_hash,
            tokens,
        }
    }
}

/// The unit of retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct IndexItem {
    pub id: String,
    pub item_type: ItemType,
    /// Back-reference to the owning business object. Chunked documents use
    /// `<documentId>_chunk_<index>`.
    pub source_id: String,
    /// `None` means global scope.
    pub data_source_id: Option<String>,
    #[serde(flatten)]
    pub body: ItemContent,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    /// `None` whenever the content changed after the last successful embedding.
    pub last_embedded_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexItem {
    /// Build a fresh, active, never-embedded item.
    pub fn new(
        item_type: ItemType,
        source_id: impl Into<String>,
        data_source_id: Option<String>,
        content: ItemContent,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            item_type,
            source_id: source_id.into(),
            data_source_id,
            body: content,
            embedding: None,
            embedding_model: None,
            last_embedded_at: None,
            is_active: true,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn content(&self) -> &str {
        self.body.content()
    }

    pub fn content_hash(&self) -> &str {
        self.body.content_hash()
    }

    pub fn tokens(&self) -> &[String] {
        self.body.tokens()
    }

    pub fn token_count(&self) -> usize {
        self.body.token_count()
    }

    /// Replace the content and mark the embedding stale in the same step.
    pub fn replace_content(&mut self, content: ItemContent) {
        self.body = content;
        self.last_embedded_at = None;
        self.updated_at = Utc::now();
    }

    /// True when the item has never been embedded or its content changed since.
    pub fn needs_embedding(&self) -> bool {
        self.embedding.is_none() || self.last_embedded_at.is_none()
    }
}

/// Which items participate in a search or a corpus statistic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeFilter {
    /// Empty means every type.
    #[serde(default)]
    pub item_types: Vec<ItemType>,
    #[serde(default)]
    pub data_source_id: Option<String>,
    /// With a `data_source_id`, also admit global (`None`) items.
    #[serde(default)]
    pub include_global: bool,
}

impl ScopeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_data_source(data_source_id: impl Into<String>) -> Self {
        Self {
            item_types: Vec::new(),
            data_source_id: Some(data_source_id.into()),
            include_global: true,
        }
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = ItemType>) -> Self {
        self.item_types = types.into_iter().collect();
        self
    }

    pub fn strict(mut self) -> Self {
        self.include_global = false;
        self
    }

    pub fn matches(&self, item: &IndexItem) -> bool {
        if !self.item_types.is_empty() && !self.item_types.contains(&item.item_type) {
            return false;
        }
        match (&self.data_source_id, &item.data_source_id) {
            (None, _) => true,
            (Some(want), Some(have)) => want == have,
            (Some(_), None) => self.include_global,
        }
    }
}

/// Persisted per-scope retrieval settings, managed by an administrator.
///
/// Every tuning field is optional; unset fields fall through to the next
/// level of the precedence chain (see [`crate::search::resolve_settings`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchProfile {
    pub name: String,
    #[serde(default)]
    pub data_source_id: Option<String>,
    /// Default profile for `data_source_id`.
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub search_method: Option<crate::search::SearchMethod>,
    #[serde(default)]
    pub dense_weight: Option<f64>,
    #[serde(default)]
    pub sparse_weight: Option<f64>,
    #[serde(default)]
    pub rrf_k: Option<f64>,
    #[serde(default)]
    pub dimensions: Option<usize>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Append-only telemetry row for one search request.
#[derive(Debug, Clone, Serialize)]
pub struct SearchLogEntry {
    pub id: String,
    pub query: String,
    pub method: String,
    pub data_source_id: Option<String>,
    pub top_k: usize,
    pub result_count: usize,
    pub dense_ms: Option<u64>,
    pub sparse_ms: Option<u64>,
    pub fusion_ms: Option<u64>,
    pub total_ms: u64,
    pub dense_degraded: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(data_source: Option<&str>, item_type: ItemType) -> IndexItem {
        IndexItem::new(
            item_type,
            "src",
            data_source.map(str::to_string),
            ItemContent::from_text("hello world"),
            serde_json::json!({}),
        )
    }

    #[test]
    fn test_item_content_derived_fields_agree() {
        let c = ItemContent::from_text("Find inactive users");
        assert_eq!(c.tokens(), &["find", "inactive", "users"]);
        assert_eq!(c.token_count(), c.tokens().len());
        assert_eq!(c.content_hash(), hash_content("Find inactive users"));
    }

    #[test]
    fn test_replace_content_marks_stale() {
        let mut it = item(None, ItemType::Table);
        it.embedding = Some(vec![1.0, 0.0]);
        it.last_embedded_at = Some(Utc::now());
        assert!(!it.needs_embedding());

        it.replace_content(ItemContent::from_text("new text"));
        assert!(it.last_embedded_at.is_none());
        assert!(it.needs_embedding());
        assert_eq!(it.content_hash(), hash_content("new text"));
    }

    #[test]
    fn test_from_stored_recomputes_mismatched_hash() {
        let c = ItemContent::from_stored(
            "fresh text".to_string(),
            "stale-hash".to_string(),
            vec!["old".to_string()],
        );
        assert_eq!(c.content_hash(), hash_content("fresh text"));
        assert_eq!(c.tokens(), &["fresh", "text"]);
    }

    #[test]
    fn test_item_type_parse() {
        assert_eq!("sample_query".parse::<ItemType>().unwrap(), ItemType::SampleQuery);
        assert_eq!("sample-query".parse::<ItemType>().unwrap(), ItemType::SampleQuery);
        assert_eq!("TABLE".parse::<ItemType>().unwrap(), ItemType::Table);
        assert!("view".parse::<ItemType>().is_err());
    }

    #[test]
    fn test_scope_filter_matching() {
        let scoped = item(Some("ds1"), ItemType::Table);
        let other = item(Some("ds2"), ItemType::Table);
        let global = item(None, ItemType::SampleQuery);

        let f = ScopeFilter::for_data_source("ds1");
        assert!(f.matches(&scoped));
        assert!(!f.matches(&other));
        assert!(f.matches(&global));

        let strict = ScopeFilter::for_data_source("ds1").strict();
        assert!(!strict.matches(&global));

        let tables = ScopeFilter::all().with_types([ItemType::Table]);
        assert!(tables.matches(&other));
        assert!(!tables.matches(&global));
    }
}
