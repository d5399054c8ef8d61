use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::fields::{Extraction, Field, RawFields};
use crate::error::ExtractionError;

static JATS_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("valid regex"));

/// A CrossRef `/works` listing (`message.items`) or a single work
/// (`message` itself).
pub fn extract_crossref(body: &str) -> Result<Extraction, ExtractionError> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| ExtractionError::Malformed(format!("invalid crossref json: {e}")))?;

    let message = root
        .get("message")
        .ok_or_else(|| ExtractionError::Malformed("crossref response has no message".into()))?;

    let works: Vec<&Value> = match message.get("items") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(_) => {
            return Err(ExtractionError::Malformed(
                "crossref message.items is not an array".into(),
            ));
        }
        None if message.is_object() => vec![message],
        None => {
            return Err(ExtractionError::Malformed(
                "crossref message is not an object".into(),
            ));
        }
    };

    Ok(Extraction::from_entries(
        works.into_iter().map(work_fields).collect(),
    ))
}

fn work_fields(work: &Value) -> RawFields {
    RawFields {
        title: Field::text(first_string(&work["title"]).map(strip_markup).as_deref()),
        authors: Field::list(parse_authors(work)),
        year: Field::text(parse_year(work).as_deref()),
        venue: Field::text(first_string(&work["container-title"])),
        publisher: Field::text(work["publisher"].as_str()),
        volume: Field::text(work["volume"].as_str()),
        issue: Field::text(work["issue"].as_str()),
        pages: Field::text(work["page"].as_str()),
        edition: Field::text(work["edition-number"].as_str()),
        abstract_text: Field::text(
            work["abstract"].as_str().map(strip_markup).as_deref(),
        ),
        url: Field::text(work["URL"].as_str()),
        isbns: Field::list(strings(&work["ISBN"])),
        doi: Field::text(work["DOI"].as_str()),
        arxiv_id: Field::Unknown,
        doc_type: Field::text(work["type"].as_str()),
        keywords: Field::list(strings(&work["subject"])),
    }
}

/// CrossRef titles and abstracts may carry JATS or HTML inline markup.
fn strip_markup(text: &str) -> String {
    JATS_TAG.replace_all(text, " ").into_owned()
}

fn first_string(value: &Value) -> Option<&str> {
    match value {
        Value::Array(items) => items.iter().find_map(Value::as_str),
        Value::String(s) => Some(s.as_str()),
        _ => None,
    }
}

fn strings(value: &Value) -> Vec<&str> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(s) => vec![s.as_str()],
        _ => Vec::new(),
    }
}

/// `Family, Given` per author; organisations arrive as `name` only.
fn parse_authors(work: &Value) -> Vec<String> {
    work["author"]
        .as_array()
        .map(|authors| {
            authors
                .iter()
                .filter_map(|a| {
                    match (a["family"].as_str(), a["given"].as_str(), a["name"].as_str()) {
                        (Some(family), Some(given), _) => Some(format!("{family}, {given}")),
                        (Some(family), None, _) => Some(family.to_string()),
                        (None, _, Some(name)) => Some(format!("{{{name}}}")),
                        _ => None,
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// First date among print, online and issued, as `YYYY[-MM[-DD]]`.
fn parse_year(work: &Value) -> Option<String> {
    ["published-print", "published-online", "issued", "created"]
        .iter()
        .find_map(|key| {
            let parts = work[*key]["date-parts"][0].as_array()?;
            let nums: Vec<i64> = parts.iter().map_while(Value::as_i64).collect();
            match nums.as_slice() {
                [] => None,
                [y] => Some(format!("{y:04}")),
                [y, m] => Some(format!("{y:04}-{m:02}")),
                [y, m, d, ..] => Some(format!("{y:04}-{m:02}-{d:02}")),
            }
        })
}
