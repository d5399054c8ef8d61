pub mod bibtex;
pub mod csl;
pub mod ris;
pub mod zotero_csv;

use std::fmt;
use std::str::FromStr;

use tsbib_core::{BibliographicRecord, Citation};

use crate::error::ExportError;

pub use bibtex::{BibEntry, generate_bibtex, parse_bibtex};

/// Per-record serializations.
pub trait Citable {
    fn to_bibtex(&self) -> String;
    fn to_ris(&self) -> String;
}

impl Citable for Citation {
    fn to_bibtex(&self) -> String {
        bibtex::generate_bibtex(self)
    }

    fn to_ris(&self) -> String {
        ris::generate_ris(self)
    }
}

impl Citable for BibliographicRecord {
    fn to_bibtex(&self) -> String {
        self.citation.to_bibtex()
    }

    fn to_ris(&self) -> String {
        self.citation.to_ris()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Bibtex,
    Ris,
    CslJson,
    ZoteroCsv,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Bibtex,
        ExportFormat::Ris,
        ExportFormat::CslJson,
        ExportFormat::ZoteroCsv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Bibtex => "bibtex",
            ExportFormat::Ris => "ris",
            ExportFormat::CslJson => "csl-json",
            ExportFormat::ZoteroCsv => "zotero-csv",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Bibtex => "bib",
            ExportFormat::Ris => "ris",
            ExportFormat::CslJson => "json",
            ExportFormat::ZoteroCsv => "csv",
        }
    }

    /// Serialize `records` in the given order.
    pub fn render(&self, records: &[&BibliographicRecord]) -> Result<String, ExportError> {
        match self {
            ExportFormat::Bibtex => Ok(records
                .iter()
                .map(|r| r.to_bibtex())
                .collect::<Vec<_>>()
                .join("\n")),
            ExportFormat::Ris => Ok(records.iter().map(|r| r.to_ris()).collect()),
            ExportFormat::CslJson => Ok(csl::generate_csl_json(records)?),
            ExportFormat::ZoteroCsv => zotero_csv::generate_zotero_csv(records),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bibtex" | "bib" => Ok(ExportFormat::Bibtex),
            "ris" => Ok(ExportFormat::Ris),
            "csl-json" | "csl" | "csljson" => Ok(ExportFormat::CslJson),
            "zotero-csv" | "csv" | "zotero" => Ok(ExportFormat::ZoteroCsv),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}
