use quick_xml::de::from_str;
use serde::Deserialize;

use super::fields::{Extraction, Field, RawFields};
use crate::error::ExtractionError;

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    published: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
    #[serde(rename = "arxiv:journal_ref", alias = "journal_ref", default)]
    journal_ref: Option<String>,
    #[serde(rename = "arxiv:doi", alias = "doi", default)]
    doi: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@type")]
    link_type: Option<String>,
    #[serde(rename = "@title")]
    title: Option<String>,
}

/// Every `<entry>` of an arXiv API feed. Entries without a title are
/// rejected by position; the rest carry whatever the feed supplied.
pub fn extract_atom(xml: &str) -> Result<Extraction, ExtractionError> {
    let feed: AtomFeed = from_str(xml)
        .map_err(|e| ExtractionError::Malformed(format!("invalid atom xml: {e}")))?;

    Ok(Extraction::from_entries(
        feed.entries.into_iter().map(entry_fields).collect(),
    ))
}

fn entry_fields(entry: AtomEntry) -> RawFields {
    // The entry id is the abs URL; the identifier normalizer strips it.
    let arxiv_id = entry.id.as_deref().filter(|id| id.contains("arxiv.org"));

    let pdf_url = entry
        .links
        .iter()
        .find(|link| {
            link.link_type.as_deref() == Some("application/pdf")
                || link.title.as_deref() == Some("pdf")
        })
        .and_then(|link| link.href.as_deref());
    let abs_url = entry
        .links
        .iter()
        .find(|link| link.link_type.as_deref() == Some("text/html"))
        .and_then(|link| link.href.as_deref())
        .or(entry.id.as_deref());

    RawFields {
        title: Field::text(entry.title.as_deref()),
        authors: Field::list(entry.authors.iter().filter_map(|a| a.name.as_deref())),
        year: Field::text(entry.published.as_deref()),
        venue: Field::text(entry.journal_ref.as_deref()),
        abstract_text: Field::text(entry.summary.as_deref()),
        url: Field::text(abs_url.or(pdf_url)),
        doi: Field::text(entry.doi.as_deref()),
        arxiv_id: Field::text(arxiv_id),
        keywords: Field::list(entry.categories.iter().filter_map(|c| c.term.as_deref())),
        ..Default::default()
    }
}
