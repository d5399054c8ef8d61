use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tsbib_core::{ExternalId, IdScheme, RecordId, TsbibError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// The shared deadline for all attempts was crossed.
    Timeout,
    /// Attempts were exhausted on retryable failures.
    Transient,
    /// The server or the request itself rejected the fetch.
    Permanent,
    Cancelled,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Transient => "transient",
            FetchErrorKind::Permanent => "permanent",
            FetchErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
#[error("fetch from {endpoint} failed ({kind}) after {attempts} attempt(s): {message}")]
pub struct FetchError {
    pub endpoint: String,
    pub kind: FetchErrorKind,
    pub attempts: u32,
    pub message: String,
}

impl FetchError {
    pub fn new(
        endpoint: impl Into<String>,
        kind: FetchErrorKind,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind,
            attempts,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Non-fatal findings while normalizing. The offending value is dropped and
/// the record is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationWarning {
    InvalidIdentifier { scheme: IdScheme, value: String },
    UnparsedYear { value: String },
    DroppedAuthor { value: String },
}

impl fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationWarning::InvalidIdentifier { scheme, value } => {
                write!(f, "invalid {scheme} identifier dropped: {value}")
            }
            NormalizationWarning::UnparsedYear { value } => {
                write!(f, "year not understood, left unknown: {value}")
            }
            NormalizationWarning::DroppedAuthor { value } => {
                write!(f, "author name not understood, dropped: {value}")
            }
        }
    }
}

/// The candidate's identifiers are held by more than one stored record, so
/// there is no single record to merge into.
#[derive(Debug, Clone, Error)]
#[error("identifiers {} belong to {} different records", display_ids(.identifiers), .owners.len())]
pub struct MergeConflict {
    pub owners: Vec<RecordId>,
    pub identifiers: Vec<ExternalId>,
}

fn display_ids(ids: &[ExternalId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] TsbibError),
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    MergeConflict(#[from] MergeConflict),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("BibTeX parse error at line {line}: {message}")]
    BibtexParse { line: usize, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] TsbibError),
}

impl HarvestError {
    /// Whether this error must stop the whole ingestion run.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, HarvestError::Store(e) if e.is_invariant_violation())
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
