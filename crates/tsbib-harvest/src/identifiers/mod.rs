//! Parsing and normalization of ISBN, DOI and arXiv identifiers.

pub mod arxiv;
pub mod doi;
pub mod isbn;

use thiserror::Error;
use tsbib_core::{ExternalId, IdScheme};

pub use arxiv::ArxivId;
pub use doi::Doi;
pub use isbn::Isbn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {scheme} identifier: {value}")]
pub struct InvalidIdentifier {
    pub scheme: IdScheme,
    pub value: String,
}

impl InvalidIdentifier {
    pub fn new(scheme: IdScheme, value: &str) -> Self {
        Self {
            scheme,
            value: value.to_string(),
        }
    }
}

/// Parse a raw identifier and return its stored form.
pub fn normalize_identifier(scheme: IdScheme, raw: &str) -> Result<ExternalId, InvalidIdentifier> {
    let value = match scheme {
        IdScheme::Isbn => Isbn::parse(raw)?.stripped,
        IdScheme::Doi => Doi::parse(raw)?.normalized,
        IdScheme::Arxiv => ArxivId::parse(raw)?.id,
    };
    Ok(ExternalId::new(scheme, value))
}
