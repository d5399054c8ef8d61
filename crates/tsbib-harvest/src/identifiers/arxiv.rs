use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tsbib_core::IdScheme;

use super::InvalidIdentifier;

// New style: YYMM.NNNN or YYMM.NNNNN, optional version
static NEW_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}\.\d{4,5})(?:v(\d+))?$").expect("valid regex"));

// Old style: archive[.SUBJ]/YYMMNNN, optional version
static OLD_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z\-]+(?:\.[a-zA-Z]{2})?/\d{7})(?:v(\d+))?$").expect("valid regex")
});

const PREFIXES: &[&str] = &[
    "https://arxiv.org/abs/",
    "http://arxiv.org/abs/",
    "https://arxiv.org/pdf/",
    "http://arxiv.org/pdf/",
    "arxiv:",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArxivId {
    pub raw: String,
    /// Identifier without version suffix. This is the stored value.
    pub id: String,
    pub version: Option<u32>,
    pub abs_url: String,
    pub pdf_url: String,
}

impl ArxivId {
    pub fn parse(input: &str) -> Result<Self, InvalidIdentifier> {
        let trimmed = input.trim();
        let lower = trimmed.to_lowercase();
        let stripped = PREFIXES
            .iter()
            .find(|prefix| lower.starts_with(*prefix))
            .map(|prefix| &trimmed[prefix.len()..])
            .unwrap_or(trimmed)
            .trim_end_matches(".pdf");

        let caps = NEW_FORMAT
            .captures(stripped)
            .or_else(|| OLD_FORMAT.captures(stripped))
            .ok_or_else(|| InvalidIdentifier::new(IdScheme::Arxiv, input))?;

        let id = caps[1].to_string();
        let version = caps.get(2).and_then(|v| v.as_str().parse::<u32>().ok());
        Ok(Self {
            raw: input.to_string(),
            abs_url: format!("https://arxiv.org/abs/{id}"),
            pdf_url: format!("https://arxiv.org/pdf/{id}"),
            id,
            version,
        })
    }
}
