use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::models::EntryType;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrder {
    /// Creation order.
    #[default]
    Created,
    /// Highest topic relevance first, then creation order.
    Relevance,
}

/// Conditions for `Database::query`. Every field is optional; an empty
/// filter returns all records in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    /// Case-insensitive substring of any author's name.
    pub author: Option<String>,
    /// Case-insensitive substring of the venue.
    pub venue: Option<String>,
    /// Case-insensitive substring of the title, the abstract or an author.
    pub text: Option<String>,
    /// Name of a source that contributed to the record.
    pub source: Option<String>,
    pub entry_type: Option<EntryType>,
    #[serde(default)]
    pub order: RecordOrder,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn years(mut self, from: Option<i32>, to: Option<i32>) -> Self {
        self.year_from = from;
        self.year_to = to;
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn entry_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn order(mut self, order: RecordOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build the `WHERE ... ORDER BY ... LIMIT` tail and its positional
    /// parameters.
    pub(crate) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(from) = self.year_from {
            params.push(Value::Integer(i64::from(from)));
            clauses.push(format!("year >= ?{}", params.len()));
        }
        if let Some(to) = self.year_to {
            params.push(Value::Integer(i64::from(to)));
            clauses.push(format!("year <= ?{}", params.len()));
        }
        if let Some(author) = self.author.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            params.push(Value::Text(like_pattern(&author.to_lowercase())));
            clauses.push(format!("authors_text LIKE ?{} ESCAPE '\\'", params.len()));
        }
        if let Some(venue) = self.venue.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            params.push(Value::Text(like_pattern(&venue.to_lowercase())));
            clauses.push(format!("lower(venue) LIKE ?{} ESCAPE '\\'", params.len()));
        }
        if let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            params.push(Value::Text(like_pattern(&text.to_lowercase())));
            let n = params.len();
            clauses.push(format!(
                "(lower(title) LIKE ?{n} ESCAPE '\\' \
                 OR lower(coalesce(abstract_text, '')) LIKE ?{n} ESCAPE '\\' \
                 OR authors_text LIKE ?{n} ESCAPE '\\')"
            ));
        }
        if let Some(source) = self.source.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            params.push(Value::Text(source.to_lowercase()));
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM record_lineage l WHERE l.record_id = records.id \
                 AND lower(json_extract(l.provenance, '$.source')) = ?{})",
                params.len()
            ));
        }
        if let Some(entry_type) = &self.entry_type {
            params.push(Value::Text(entry_type.as_str().to_string()));
            clauses.push(format!("entry_type = ?{}", params.len()));
        }

        let mut sql = String::new();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(match self.order {
            RecordOrder::Created => " ORDER BY seq",
            RecordOrder::Relevance => " ORDER BY relevance DESC, seq",
        });
        if let Some(limit) = self.limit {
            params.push(Value::Integer(limit as i64));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }
        (sql, params)
    }
}

fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
