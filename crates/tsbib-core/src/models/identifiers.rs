use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TsbibError;

/// Identifier schemes that are presumed globally unique per work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdScheme {
    Isbn,
    Doi,
    Arxiv,
}

impl IdScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdScheme::Isbn => "isbn",
            IdScheme::Doi => "doi",
            IdScheme::Arxiv => "arxiv",
        }
    }

    /// Whether one work may legitimately carry several values of this scheme
    /// (hardcover and paperback ISBNs, for instance).
    pub fn allows_multiple(&self) -> bool {
        matches!(self, IdScheme::Isbn)
    }
}

impl fmt::Display for IdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdScheme {
    type Err = TsbibError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isbn" => Ok(IdScheme::Isbn),
            "doi" => Ok(IdScheme::Doi),
            "arxiv" | "eprint" => Ok(IdScheme::Arxiv),
            other => Err(TsbibError::ValidationError(format!(
                "unknown identifier scheme: {other}"
            ))),
        }
    }
}

/// A scheme-qualified, already normalized identifier value.
///
/// Values are expected to come out of the normalizer: ISBNs stripped of
/// separators and checksum-validated, DOIs lowercased without resolver prefix,
/// arXiv ids without version suffix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalId {
    pub scheme: IdScheme,
    pub value: String,
}

impl ExternalId {
    pub fn new(scheme: IdScheme, value: impl Into<String>) -> Self {
        Self {
            scheme,
            value: value.into(),
        }
    }

    /// Key used for uniqueness and lookups. ISBN-10 values are folded into
    /// their ISBN-13 form so both editions of the number collide.
    pub fn match_key(&self) -> String {
        match self.scheme {
            IdScheme::Isbn => isbn13_key(&self.value).unwrap_or_else(|| self.value.clone()),
            IdScheme::Doi | IdScheme::Arxiv => self.value.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.value)
    }
}

fn isbn13_key(value: &str) -> Option<String> {
    match value.len() {
        13 => Some(value.to_string()),
        10 => {
            let mut digits: Vec<u32> = vec![9, 7, 8];
            for c in value[..9].chars() {
                digits.push(c.to_digit(10)?);
            }
            let sum: u32 = digits
                .iter()
                .enumerate()
                .map(|(i, d)| if i % 2 == 0 { *d } else { d * 3 })
                .sum();
            digits.push((10 - sum % 10) % 10);
            Some(digits.iter().map(|d| d.to_string()).collect())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isbn10_and_isbn13_share_match_key() {
        let ten = ExternalId::new(IdScheme::Isbn, "0306406152");
        let thirteen = ExternalId::new(IdScheme::Isbn, "9780306406157");
        assert_eq!(ten.match_key(), thirteen.match_key());
    }

    #[test]
    fn isbn10_with_x_check_digit_folds() {
        let id = ExternalId::new(IdScheme::Isbn, "007462542X");
        assert_eq!(id.match_key(), "9780074625422");
    }

    #[test]
    fn scheme_parses_eprint_alias() {
        assert_eq!("eprint".parse::<IdScheme>().unwrap(), IdScheme::Arxiv);
        assert_eq!("ISBN".parse::<IdScheme>().unwrap(), IdScheme::Isbn);
        assert!("issn".parse::<IdScheme>().is_err());
    }

    #[test]
    fn doi_match_key_is_case_insensitive() {
        let id = ExternalId::new(IdScheme::Doi, "10.1000/ABC");
        assert_eq!(id.match_key(), "10.1000/abc");
    }
}
