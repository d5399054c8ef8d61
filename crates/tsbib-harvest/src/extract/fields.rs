use serde::Serialize;

use crate::error::ExtractionError;

/// A value a source either supplied or did not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Field<T> {
    Known(T),
    #[default]
    Unknown,
}

impl<T> Field<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Field::Known(_))
    }

    pub fn known(self) -> Option<T> {
        match self {
            Field::Known(v) => Some(v),
            Field::Unknown => None,
        }
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Known(v) => Field::Known(v),
            Field::Unknown => Field::Unknown,
        }
    }

    /// Keep the current value, or take `other` if this one is unknown.
    pub fn or(self, other: Field<T>) -> Field<T> {
        match self {
            Field::Known(v) => Field::Known(v),
            Field::Unknown => other,
        }
    }
}

impl Field<String> {
    /// Whitespace-collapsed text; blank strings stay unknown.
    pub fn text(value: Option<&str>) -> Self {
        match value.map(collapse_whitespace).filter(|s| !s.is_empty()) {
            Some(s) => Field::Known(s),
            None => Field::Unknown,
        }
    }
}

impl Field<Vec<String>> {
    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<String> = values
            .into_iter()
            .map(|s| collapse_whitespace(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        if items.is_empty() {
            Field::Unknown
        } else {
            Field::Known(items)
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Known(v),
            None => Field::Unknown,
        }
    }
}

/// Source-shaped fields of one work, before any normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawFields {
    pub title: Field<String>,
    /// Author strings as the source wrote them; one string may hold several
    /// names.
    pub authors: Field<Vec<String>>,
    pub year: Field<String>,
    pub venue: Field<String>,
    pub publisher: Field<String>,
    pub volume: Field<String>,
    pub issue: Field<String>,
    pub pages: Field<String>,
    pub edition: Field<String>,
    pub abstract_text: Field<String>,
    pub url: Field<String>,
    pub isbns: Field<Vec<String>>,
    pub doi: Field<String>,
    pub arxiv_id: Field<String>,
    /// Source-specific document type, e.g. CrossRef's `journal-article`.
    pub doc_type: Field<String>,
    pub keywords: Field<Vec<String>>,
}

impl RawFields {
    pub fn require_title(&self) -> Result<(), ExtractionError> {
        if self.title.is_known() {
            Ok(())
        } else {
            Err(ExtractionError::MissingRequiredField("title"))
        }
    }
}

/// Records pulled out of one payload. Feed entries that could not be used
/// are listed by position in `rejected`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub records: Vec<RawFields>,
    pub rejected: Vec<(usize, ExtractionError)>,
}

impl Extraction {
    /// Keep entries with a title, reject the rest by position.
    pub fn from_entries(entries: Vec<RawFields>) -> Self {
        let mut extraction = Extraction::default();
        for (index, fields) in entries.into_iter().enumerate() {
            match fields.require_title() {
                Ok(()) => extraction.records.push(fields),
                Err(e) => extraction.rejected.push((index, e)),
            }
        }
        extraction
    }
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
