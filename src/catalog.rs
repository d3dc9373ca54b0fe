//! JSON source catalog.
//!
//! A file-backed [`SourceCatalog`] describing the business objects the index
//! mirrors: tables (with their columns), curated sample queries, and
//! long-form documents. The file is re-read on every [`JsonCatalog::load`],
//! so edits are picked up by the next sync.
//!
//! ```json
//! {
//!   "tables": [{
//!     "id": "tbl-users", "data_source_id": "warehouse", "name": "users",
//!     "description": "Registered accounts",
//!     "columns": [{ "id": "col-users-email", "name": "email", "data_type": "text" }]
//!   }],
//!   "sample_queries": [{
//!     "id": "q-inactive", "data_source_id": "warehouse",
//!     "question": "find inactive users", "sql": "SELECT * FROM users WHERE active = false"
//!   }],
//!   "documents": [{ "id": "doc-glossary", "title": "Glossary", "content": "..." }]
//! }
//! ```
//!
//! Every object renders to canonical text (see the `render_*` functions);
//! each column becomes its own `COLUMN` item.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use catalog_search_core::models::ItemType;
use catalog_search_core::sync::{SourceCatalog, SourceRecord};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub sample_queries: Vec<SampleQueryDef>,
    #[serde(default)]
    pub documents: Vec<DocumentDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableDef {
    pub id: String,
    #[serde(default)]
    pub data_source_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub excluded: bool,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub excluded: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleQueryDef {
    pub id: String,
    #[serde(default)]
    pub data_source_id: Option<String>,
    pub question: String,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub excluded: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentDef {
    pub id: String,
    #[serde(default)]
    pub data_source_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub excluded: bool,
}

pub fn render_table(table: &TableDef) -> String {
    let mut out = format!("Table: {}", table.name);
    if let Some(desc) = non_empty(&table.description) {
        out.push_str(&format!("\nDescription: {}", desc));
    }
    let columns: Vec<&ColumnDef> = table.columns.iter().filter(|c| !c.excluded).collect();
    if !columns.is_empty() {
        out.push_str("\nColumns:");
        for col in columns {
            out.push_str(&format!("\n- {}", col.name));
            if let Some(ty) = non_empty(&col.data_type) {
                out.push_str(&format!(" ({})", ty));
            }
            if let Some(desc) = non_empty(&col.description) {
                out.push_str(&format!(": {}", desc));
            }
        }
    }
    out
}

pub fn render_column(table: &TableDef, column: &ColumnDef) -> String {
    let mut out = format!("Column: {}.{}", table.name, column.name);
    if let Some(ty) = non_empty(&column.data_type) {
        out.push_str(&format!("\nType: {}", ty));
    }
    if let Some(desc) = non_empty(&column.description) {
        out.push_str(&format!("\nDescription: {}", desc));
    }
    out
}

pub fn render_sample_query(query: &SampleQueryDef) -> String {
    let mut out = format!("Question: {}", query.question);
    if let Some(sql) = non_empty(&query.sql) {
        out.push_str(&format!("\nSQL: {}", sql));
    }
    if let Some(desc) = non_empty(&query.description) {
        out.push_str(&format!("\nDescription: {}", desc));
    }
    out
}

pub fn render_document(doc: &DocumentDef) -> String {
    match non_empty(&doc.title) {
        Some(title) => format!("{}\n\n{}", title, doc.content),
        None => doc.content.clone(),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl CatalogFile {
    /// Flatten into one record per indexable object.
    pub fn records(&self) -> Vec<SourceRecord> {
        let mut out = Vec::new();

        for table in &self.tables {
            out.push(SourceRecord {
                source_id: table.id.clone(),
                item_type: ItemType::Table,
                data_source_id: table.data_source_id.clone(),
                content: render_table(table),
                metadata: serde_json::json!({
                    "name": table.name,
                    "column_count": table.columns.len(),
                }),
                excluded: table.excluded,
            });
            for col in &table.columns {
                out.push(SourceRecord {
                    source_id: col.id.clone(),
                    item_type: ItemType::Column,
                    data_source_id: table.data_source_id.clone(),
                    content: render_column(table, col),
                    metadata: serde_json::json!({
                        "name": col.name,
                        "table_id": table.id,
                        "table_name": table.name,
                        "data_type": col.data_type,
                    }),
                    excluded: table.excluded || col.excluded,
                });
            }
        }

        for q in &self.sample_queries {
            out.push(SourceRecord {
                source_id: q.id.clone(),
                item_type: ItemType::SampleQuery,
                data_source_id: q.data_source_id.clone(),
                content: render_sample_query(q),
                metadata: serde_json::json!({
                    "question": q.question,
                    "sql": q.sql,
                }),
                excluded: q.excluded,
            });
        }

        for doc in &self.documents {
            out.push(SourceRecord {
                source_id: doc.id.clone(),
                item_type: ItemType::Document,
                data_source_id: doc.data_source_id.clone(),
                content: render_document(doc),
                metadata: serde_json::json!({ "title": doc.title }),
                excluded: doc.excluded,
            });
        }

        out
    }
}

/// [`SourceCatalog`] over a parsed catalog file.
pub struct JsonCatalog {
    records: Vec<SourceRecord>,
}

impl JsonCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse catalog file: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(content)?;
        Ok(Self::from_file(&file))
    }

    pub fn from_file(file: &CatalogFile) -> Self {
        Self {
            records: file.records(),
        }
    }

    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }
}

#[async_trait]
impl SourceCatalog for JsonCatalog {
    async fn fetch(&self, source_id: &str, item_type: ItemType) -> Result<Option<SourceRecord>> {
        Ok(self
            .records
            .iter()
            .find(|r| r.source_id == source_id && r.item_type == item_type)
            .cloned())
    }

    async fn list_for_scope(&self, data_source_id: &str) -> Result<Vec<SourceRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.data_source_id.as_deref() == Some(data_source_id))
            .cloned()
            .collect())
    }
}
