//! Extracted fields and BibTeX entries into canonical citations.

mod authors;
mod cite_key;
mod classify;
mod relevance;
mod title;
mod year;

pub use authors::{parse_name, split_author_list, split_bibtex_names};
pub use cite_key::generate_cite_key;
pub use classify::{classify, type_from_hint};
pub use relevance::relevance;
pub use title::{clean_title, title_key, unescape_tex};
pub use year::parse_year;

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tsbib_core::{
    Author, CandidateRecord, Citation, EntryType, ExternalId, IdScheme, Provenance, SourceFormat,
};

use crate::error::{ExtractionError, NormalizationWarning};
use crate::extract::RawFields;
use crate::formats::BibEntry;
use crate::identifiers::normalize_identifier;

static PAGE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\w+)\s*[-\x{2013}\x{2014}]+\s*(\w+)\s*$").expect("valid regex")
});

/// A candidate ready for the dedup engine, plus what was dropped on the way.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub record: CandidateRecord,
    pub warnings: Vec<NormalizationWarning>,
}

#[derive(Default)]
struct Collector {
    identifiers: BTreeSet<ExternalId>,
    warnings: Vec<NormalizationWarning>,
}

impl Collector {
    fn identifier(&mut self, scheme: IdScheme, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        // One DOI and one arXiv id per work; later values are ignored.
        if !scheme.allows_multiple() && self.identifiers.iter().any(|id| id.scheme == scheme) {
            return;
        }
        match normalize_identifier(scheme, raw) {
            Ok(id) => {
                if !self.identifiers.iter().any(|known| known.match_key() == id.match_key()) {
                    self.identifiers.insert(id);
                }
            }
            Err(e) => self.warnings.push(NormalizationWarning::InvalidIdentifier {
                scheme: e.scheme,
                value: e.value,
            }),
        }
    }

    fn isbn_list(&mut self, raw: &str) {
        for part in raw.split([',', ';']) {
            self.identifier(IdScheme::Isbn, part);
        }
    }

    fn authors<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> Vec<Author> {
        let mut authors = Vec::new();
        for name in names {
            match parse_name(name) {
                Some(author) => authors.push(author),
                None => self.warnings.push(NormalizationWarning::DroppedAuthor {
                    value: name.to_string(),
                }),
            }
        }
        authors
    }

    fn year(&mut self, raw: &str) -> Option<i32> {
        let year = parse_year(raw);
        if year.is_none() {
            self.warnings.push(NormalizationWarning::UnparsedYear {
                value: raw.to_string(),
            });
        }
        year
    }
}

fn normalize_pages(pages: &str) -> String {
    match PAGE_RANGE.captures(pages) {
        Some(caps) => format!("{}--{}", &caps[1], &caps[2]),
        None => pages.trim().to_string(),
    }
}

fn join_keywords(keywords: Vec<String>) -> Option<String> {
    let mut seen = BTreeSet::new();
    let unique: Vec<String> = keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty() && seen.insert(k.to_lowercase()))
        .collect();
    (!unique.is_empty()).then(|| unique.join(", "))
}

fn finish(mut citation: Citation, collector: Collector, provenance: Provenance) -> Normalized {
    citation.identifiers = collector.identifiers;
    if citation.cite_key.is_none() {
        citation.cite_key = Some(generate_cite_key(&citation));
    }
    let relevance = relevance(&citation.title, citation.abstract_text.as_deref());
    Normalized {
        record: CandidateRecord::new(citation, provenance).with_relevance(relevance),
        warnings: collector.warnings,
    }
}

/// Canonical candidate from extracted source fields. Only a missing title
/// is fatal; bad identifiers, years and names become warnings.
pub fn normalize_fields(
    raw: RawFields,
    format: SourceFormat,
    provenance: Provenance,
) -> Result<Normalized, ExtractionError> {
    let RawFields {
        title,
        authors,
        year,
        venue,
        publisher,
        volume,
        issue,
        pages,
        edition,
        abstract_text,
        url,
        isbns,
        doi,
        arxiv_id,
        doc_type,
        keywords,
    } = raw;

    let title = title
        .known()
        .map(|t| clean_title(&t))
        .filter(|t| !t.is_empty())
        .ok_or(ExtractionError::MissingRequiredField("title"))?;

    let mut collector = Collector::default();
    let author_strings = authors.known().unwrap_or_default();
    let names: Vec<String> = author_strings
        .iter()
        .flat_map(|a| split_author_list(a))
        .collect();

    let mut citation = Citation::new(title);
    citation.authors = collector.authors(names.iter().map(String::as_str));
    citation.year = year.known().and_then(|y| collector.year(&y));
    citation.venue = venue.known();
    citation.publisher = publisher.known();
    citation.volume = volume.known();
    citation.number = issue.known();
    citation.pages = pages.known().map(|p| normalize_pages(&p));
    citation.edition = edition.known();
    citation.abstract_text = abstract_text.known();
    citation.url = url.known();
    citation.keywords = join_keywords(keywords.known().unwrap_or_default());

    for isbn in isbns.known().unwrap_or_default() {
        collector.isbn_list(&isbn);
    }
    if let Some(doi) = doi.known() {
        collector.identifier(IdScheme::Doi, &doi);
    }
    if let Some(arxiv) = arxiv_id.known() {
        collector.identifier(IdScheme::Arxiv, &arxiv);
    }

    citation.entry_type = classify(
        doc_type.known().as_deref(),
        &citation.title,
        citation.abstract_text.as_deref(),
        format,
    );

    Ok(finish(citation, collector, provenance))
}

/// Canonical candidate from a parsed BibTeX entry. Fields without a
/// canonical slot are kept in `extra`; the title keeps its TeX form for
/// export.
pub fn normalize_bib_entry(
    entry: &BibEntry,
    provenance: Provenance,
) -> Result<Normalized, ExtractionError> {
    let tex = entry.get("title").unwrap_or_default();
    let title = Some(clean_title(tex))
        .filter(|t| !t.is_empty())
        .ok_or(ExtractionError::MissingRequiredField("title"))?;

    let mut collector = Collector::default();
    let mut citation = Citation::new(title);
    citation.title_tex = Some(tex.to_string()).filter(|tex| *tex != citation.title);
    citation.entry_type = EntryType::from(entry.entry_type.as_str());
    citation.cite_key = Some(entry.key.trim().to_string()).filter(|k| !k.is_empty());

    let venue_field = citation.entry_type.venue_field();
    let arxiv_prefix = entry
        .get("archiveprefix")
        .is_none_or(|prefix| prefix.eq_ignore_ascii_case("arxiv"));

    for (name, value) in &entry.fields {
        let text = || Some(unescape_tex(value)).filter(|v| !v.trim().is_empty());
        match name.as_str() {
            "title" => {}
            "author" => {
                let (names, others) = split_bibtex_names(value);
                citation.authors = collector.authors(names.iter().map(String::as_str));
                citation.authors_truncated = others;
            }
            "editor" => {
                let (names, others) = split_bibtex_names(value);
                citation.editors = collector.authors(names.iter().map(String::as_str));
                citation.editors_truncated = others;
            }
            "year" => {
                citation.year = collector.year(value);
                if citation.year.is_none() {
                    citation.extra.insert(name.clone(), value.clone());
                }
            }
            "month" => citation.month = text(),
            n if n == venue_field => citation.venue = text(),
            "publisher" => citation.publisher = text(),
            "edition" => citation.edition = text(),
            "series" => citation.series = text(),
            "volume" => citation.volume = text(),
            "number" => citation.number = text(),
            "pages" => citation.pages = text(),
            "address" => citation.address = text(),
            "note" => citation.note = text(),
            "abstract" => citation.abstract_text = text(),
            "keywords" => citation.keywords = text(),
            "url" => citation.url = Some(value.clone()).filter(|v| !v.is_empty()),
            "isbn" => collector.isbn_list(value),
            "doi" => collector.identifier(IdScheme::Doi, value),
            "eprint" if arxiv_prefix => collector.identifier(IdScheme::Arxiv, value),
            "archiveprefix" if arxiv_prefix => {}
            _ => {
                if let Some(v) = text() {
                    citation.extra.insert(name.clone(), v);
                }
            }
        }
    }

    Ok(finish(citation, collector, provenance))
}
