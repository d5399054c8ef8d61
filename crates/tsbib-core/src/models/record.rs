use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Citation, IdScheme};
use crate::error::TsbibError;

/// Stable internal identifier. Assigned once on first insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = TsbibError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| TsbibError::RecordNotFound(s.to_string()))
    }
}

/// Where an input came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Configured source name, or `bibtex` for file imports.
    pub source: String,
    /// Endpoint URL or import path.
    pub origin: String,
    pub retrieved_at: DateTime<Utc>,
}

impl Provenance {
    pub fn new(source: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            origin: origin.into(),
            retrieved_at: Utc::now(),
        }
    }
}

/// How an absorbed input was attached to its record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    /// The input that created the record.
    Origin,
    Identifier { scheme: IdScheme },
    Similarity { score: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEntry {
    /// Content fingerprint of the absorbed input.
    pub fingerprint: String,
    pub provenance: Provenance,
    pub matched_by: MatchKind,
    pub absorbed_at: DateTime<Utc>,
}

/// Normalized input that has not been anchored in the store yet.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub citation: Citation,
    pub provenance: Provenance,
    /// Time-series topic relevance in `[0, 1]`.
    pub relevance: f64,
}

impl CandidateRecord {
    pub fn new(citation: Citation, provenance: Provenance) -> Self {
        Self {
            citation,
            provenance,
            relevance: 0.0,
        }
    }

    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance = relevance;
        self
    }
}

/// The canonical, stored representation of one work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BibliographicRecord {
    pub id: RecordId,
    /// Store-assigned creation order; zero until persisted.
    #[serde(default)]
    pub seq: i64,
    pub citation: Citation,
    pub provenance: Provenance,
    /// Highest topic relevance of any absorbed input.
    #[serde(default)]
    pub relevance: f64,
    #[serde(default)]
    pub lineage: Vec<LineageEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BibliographicRecord {
    /// Anchor a candidate as a brand new record whose lineage starts with
    /// the candidate itself.
    pub fn from_candidate(candidate: CandidateRecord, fingerprint: String) -> Self {
        let now = Utc::now();
        let origin = LineageEntry {
            fingerprint,
            provenance: candidate.provenance.clone(),
            matched_by: MatchKind::Origin,
            absorbed_at: now,
        };
        Self {
            id: RecordId::generate(),
            seq: 0,
            citation: candidate.citation,
            provenance: candidate.provenance,
            relevance: candidate.relevance,
            lineage: vec![origin],
            created_at: now,
            updated_at: now,
        }
    }
}
