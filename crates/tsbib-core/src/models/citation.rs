use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Author, ExternalId, IdScheme};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryType {
    Book,
    Article,
    InProceedings,
    InCollection,
    InBook,
    PhdThesis,
    MastersThesis,
    TechReport,
    Unpublished,
    #[default]
    Misc,
    /// Any entry type we do not model; kept verbatim (lowercased).
    Other(String),
}

impl EntryType {
    pub fn as_str(&self) -> &str {
        match self {
            EntryType::Book => "book",
            EntryType::Article => "article",
            EntryType::InProceedings => "inproceedings",
            EntryType::InCollection => "incollection",
            EntryType::InBook => "inbook",
            EntryType::PhdThesis => "phdthesis",
            EntryType::MastersThesis => "mastersthesis",
            EntryType::TechReport => "techreport",
            EntryType::Unpublished => "unpublished",
            EntryType::Misc => "misc",
            EntryType::Other(name) => name.as_str(),
        }
    }

    /// BibTeX field that carries the venue for this entry type.
    pub fn venue_field(&self) -> &'static str {
        match self {
            EntryType::Article => "journal",
            EntryType::InProceedings | EntryType::InCollection => "booktitle",
            EntryType::PhdThesis | EntryType::MastersThesis => "school",
            EntryType::TechReport => "institution",
            _ => "howpublished",
        }
    }

    /// `misc` and unknown types carry the least information; any other type
    /// is preferred over them during a merge.
    pub fn is_generic(&self) -> bool {
        matches!(self, EntryType::Misc | EntryType::Other(_))
    }
}

impl From<String> for EntryType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "book" => EntryType::Book,
            "article" => EntryType::Article,
            "inproceedings" | "conference" => EntryType::InProceedings,
            "incollection" => EntryType::InCollection,
            "inbook" => EntryType::InBook,
            "phdthesis" => EntryType::PhdThesis,
            "mastersthesis" => EntryType::MastersThesis,
            "techreport" => EntryType::TechReport,
            "unpublished" => EntryType::Unpublished,
            "misc" | "" => EntryType::Misc,
            other => EntryType::Other(other.to_string()),
        }
    }
}

impl From<&str> for EntryType {
    fn from(value: &str) -> Self {
        EntryType::from(value.to_string())
    }
}

impl From<EntryType> for String {
    fn from(value: EntryType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bibliographic content of one work. Shared by stored records and
/// candidates that have not been anchored in the store yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub entry_type: EntryType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cite_key: Option<String>,

    pub title: String,

    /// Title as written in TeX, with case-protecting braces and escapes.
    /// Only set when it differs from `title`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_tex: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,

    /// The source list ended in `and others`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub authors_truncated: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub editors: Vec<Author>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub editors_truncated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub identifiers: BTreeSet<ExternalId>,

    /// Fields without a canonical slot, keyed by lowercase BibTeX name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Citation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn identifier(&self, scheme: IdScheme) -> Option<&ExternalId> {
        self.identifiers.iter().find(|id| id.scheme == scheme)
    }

    pub fn identifiers_of(&self, scheme: IdScheme) -> impl Iterator<Item = &ExternalId> {
        self.identifiers.iter().filter(move |id| id.scheme == scheme)
    }

    pub fn has_identifiers(&self) -> bool {
        !self.identifiers.is_empty()
    }

    /// Names of the optional scalar fields that carry a value; used to
    /// assert that merges never lose information.
    pub fn known_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let optional = [
            ("cite_key", &self.cite_key),
            ("month", &self.month),
            ("venue", &self.venue),
            ("publisher", &self.publisher),
            ("volume", &self.volume),
            ("number", &self.number),
            ("pages", &self.pages),
            ("edition", &self.edition),
            ("series", &self.series),
            ("address", &self.address),
            ("note", &self.note),
            ("abstract", &self.abstract_text),
            ("keywords", &self.keywords),
            ("url", &self.url),
        ];
        for (name, value) in optional {
            if value.is_some() {
                fields.push(name);
            }
        }
        if self.year.is_some() {
            fields.push("year");
        }
        if !self.authors.is_empty() {
            fields.push("authors");
        }
        if !self.editors.is_empty() {
            fields.push("editors");
        }
        fields
    }
}
