use serde::{Deserialize, Serialize};
use tsbib_core::IdScheme;

use super::InvalidIdentifier;

const PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi.org/",
    "doi:",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doi {
    pub raw: String,
    pub normalized: String,
    pub url: String,
}

impl Doi {
    pub fn parse(input: &str) -> Result<Self, InvalidIdentifier> {
        let invalid = || InvalidIdentifier::new(IdScheme::Doi, input);
        let trimmed = input.trim();

        let lower = trimmed.to_lowercase();
        let stripped = PREFIXES
            .iter()
            .find(|prefix| lower.starts_with(*prefix))
            .map(|prefix| trimmed[prefix.len()..].trim_start())
            .unwrap_or(trimmed);
        let stripped: String = stripped.chars().filter(|c| !c.is_whitespace()).collect();

        // 10.<registrant>/<suffix>
        let Some(rest) = stripped.strip_prefix("10.") else {
            return Err(invalid());
        };
        let (registrant, suffix) = rest.split_once('/').ok_or_else(invalid)?;
        if registrant.is_empty() || suffix.is_empty() {
            return Err(invalid());
        }

        let normalized = stripped.to_lowercase();
        let url = format!("https://doi.org/{normalized}");

        Ok(Self {
            raw: input.to_string(),
            normalized,
            url,
        })
    }
}
