use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};

use super::fields::{Field, RawFields, collapse_whitespace};
use crate::error::ExtractionError;

fn parse_selector(input: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(input)
        .map_err(|e| ExtractionError::Malformed(format!("invalid selector {input}: {e}")))
}

fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// `<meta name=...>` values keyed by lowercased name, in document order.
fn meta_values(document: &Html) -> Result<BTreeMap<String, Vec<String>>, ExtractionError> {
    let selector = parse_selector("meta[name][content]")?;
    let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for meta in document.select(&selector) {
        let (Some(name), Some(content)) = (meta.value().attr("name"), meta.value().attr("content"))
        else {
            continue;
        };
        let content = collapse_whitespace(content);
        if !content.is_empty() {
            values.entry(name.to_lowercase()).or_default().push(content);
        }
    }
    Ok(values)
}

/// Two-column `<tr><th|td>Label</th><td>Value</td></tr>` rows, keyed by the
/// lowercased label without a trailing colon.
fn table_values(document: &Html) -> Result<BTreeMap<String, String>, ExtractionError> {
    let rows = parse_selector("tr")?;
    let cells = parse_selector("th, td")?;
    let mut values = BTreeMap::new();
    for row in document.select(&rows) {
        let mut row_cells = row.select(&cells);
        let (Some(label), Some(value)) = (row_cells.next(), row_cells.next()) else {
            continue;
        };
        let label = element_text(&label)
            .trim_end_matches(':')
            .trim()
            .to_lowercase();
        let value = element_text(&value);
        if !label.is_empty() && !value.is_empty() {
            values.entry(label).or_insert(value);
        }
    }
    Ok(values)
}

fn first_of(meta: &BTreeMap<String, Vec<String>>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| meta.get(*name).and_then(|v| v.first()).cloned())
}

fn all_of(meta: &BTreeMap<String, Vec<String>>, names: &[&str]) -> Vec<String> {
    names
        .iter()
        .find_map(|name| meta.get(*name).filter(|v| !v.is_empty()))
        .cloned()
        .unwrap_or_default()
}

fn table_first(table: &BTreeMap<String, String>, labels: &[&str]) -> Option<String> {
    labels.iter().find_map(|label| table.get(*label)).cloned()
}

fn from_meta(meta: &BTreeMap<String, Vec<String>>) -> RawFields {
    let first_page = first_of(meta, &["citation_firstpage"]);
    let last_page = first_of(meta, &["citation_lastpage"]);
    let pages = match (first_page, last_page) {
        (Some(first), Some(last)) => Some(format!("{first}--{last}")),
        (first, _) => first,
    };

    let keywords = all_of(meta, &["citation_keywords", "keywords"])
        .iter()
        .flat_map(|k| k.split([';', ',']))
        .map(str::to_string)
        .collect::<Vec<_>>();

    RawFields {
        title: Field::text(first_of(meta, &["citation_title", "dc.title"]).as_deref()),
        authors: Field::list(all_of(meta, &["citation_author", "dc.creator"])),
        year: Field::text(
            first_of(
                meta,
                &[
                    "citation_publication_date",
                    "citation_date",
                    "citation_year",
                    "dc.date",
                ],
            )
            .as_deref(),
        ),
        venue: Field::text(
            first_of(
                meta,
                &[
                    "citation_journal_title",
                    "citation_conference_title",
                    "citation_inbook_title",
                    "citation_dissertation_institution",
                    "citation_technical_report_institution",
                ],
            )
            .as_deref(),
        ),
        publisher: Field::text(first_of(meta, &["citation_publisher", "dc.publisher"]).as_deref()),
        volume: Field::text(first_of(meta, &["citation_volume"]).as_deref()),
        issue: Field::text(first_of(meta, &["citation_issue"]).as_deref()),
        pages: Field::text(pages.as_deref()),
        edition: Field::Unknown,
        abstract_text: Field::text(
            first_of(meta, &["citation_abstract", "dc.description"]).as_deref(),
        ),
        url: Field::text(
            first_of(meta, &["citation_abstract_html_url", "citation_public_url"]).as_deref(),
        ),
        isbns: Field::list(all_of(meta, &["citation_isbn"])),
        doi: Field::text(first_of(meta, &["citation_doi", "dc.identifier.doi"]).as_deref()),
        arxiv_id: Field::text(first_of(meta, &["citation_arxiv_id"]).as_deref()),
        doc_type: Field::text(first_of(meta, &["dc.type"]).as_deref()),
        keywords: Field::list(keywords),
    }
}

fn from_table(table: &BTreeMap<String, String>) -> RawFields {
    let authors = table_first(table, &["author(s)", "authors", "author", "creator", "by"]);
    let isbns = table_first(table, &["isbn", "isbn-13", "isbn-10", "isbn13", "isbn10"])
        .map(|v| v.split([',', ';']).map(str::to_string).collect::<Vec<_>>())
        .unwrap_or_default();
    let keywords = table_first(table, &["subjects", "subject", "keywords"])
        .map(|v| v.split([',', ';']).map(str::to_string).collect::<Vec<_>>())
        .unwrap_or_default();

    RawFields {
        title: Field::text(table_first(table, &["title"]).as_deref()),
        authors: Field::list(authors),
        year: Field::text(
            table_first(table, &["year", "published", "publication date", "date"]).as_deref(),
        ),
        venue: Field::text(table_first(table, &["journal", "venue", "conference"]).as_deref()),
        publisher: Field::text(table_first(table, &["publisher"]).as_deref()),
        volume: Field::text(table_first(table, &["volume"]).as_deref()),
        issue: Field::text(table_first(table, &["issue", "number"]).as_deref()),
        pages: Field::text(table_first(table, &["pages"]).as_deref()),
        edition: Field::text(table_first(table, &["edition"]).as_deref()),
        abstract_text: Field::text(
            table_first(table, &["abstract", "description", "summary"]).as_deref(),
        ),
        url: Field::text(table_first(table, &["url", "link"]).as_deref()),
        isbns: Field::list(isbns),
        doi: Field::text(table_first(table, &["doi"]).as_deref()),
        arxiv_id: Field::text(table_first(table, &["arxiv", "arxiv id"]).as_deref()),
        doc_type: Field::text(table_first(table, &["type", "document type"]).as_deref()),
        keywords: Field::list(keywords),
    }
}

/// One record per page: citation meta tags first, a label/value table for
/// whatever they leave out. A page without a title is rejected.
pub fn extract_html(html: &str, page_url: &str) -> Result<RawFields, ExtractionError> {
    let document = Html::parse_document(html);
    let meta = meta_values(&document)?;
    let table = table_values(&document)?;

    let m = from_meta(&meta);
    let t = from_table(&table);
    let fields = RawFields {
        title: m.title.or(t.title),
        authors: m.authors.or(t.authors),
        year: m.year.or(t.year),
        venue: m.venue.or(t.venue),
        publisher: m.publisher.or(t.publisher),
        volume: m.volume.or(t.volume),
        issue: m.issue.or(t.issue),
        pages: m.pages.or(t.pages),
        edition: m.edition.or(t.edition),
        abstract_text: m.abstract_text.or(t.abstract_text),
        url: m.url.or(t.url).or(Field::text(Some(page_url))),
        isbns: m.isbns.or(t.isbns),
        doi: m.doi.or(t.doi),
        arxiv_id: m.arxiv_id.or(t.arxiv_id),
        doc_type: m.doc_type.or(t.doc_type),
        keywords: m.keywords.or(t.keywords),
    };
    fields.require_title()?;
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_citation_meta_tags() {
        let html = r#"<html><head>
            <meta name="citation_title" content="Time Series Analysis: Forecasting and Control">
            <meta name="citation_author" content="Box, George E. P.">
            <meta name="citation_author" content="Jenkins, Gwilym M.">
            <meta name="citation_publication_date" content="1976/01/01">
            <meta name="citation_publisher" content="Holden-Day">
            <meta name="citation_isbn" content="0-8162-1104-3">
            <meta name="citation_firstpage" content="1">
            <meta name="citation_lastpage" content="575">
        </head><body></body></html>"#;

        let fields = extract_html(html, "https://catalog.example.org/item/1").unwrap();
        assert_eq!(
            fields.title,
            Field::Known("Time Series Analysis: Forecasting and Control".to_string())
        );
        assert_eq!(
            fields.authors,
            Field::Known(vec![
                "Box, George E. P.".to_string(),
                "Jenkins, Gwilym M.".to_string()
            ])
        );
        assert_eq!(fields.pages, Field::Known("1--575".to_string()));
        assert_eq!(
            fields.url,
            Field::Known("https://catalog.example.org/item/1".to_string())
        );
    }

    #[test]
    fn falls_back_to_label_table() {
        let html = r#"<html><body><table>
            <tr><th>Title:</th><td>The Analysis of Time Series</td></tr>
            <tr><th>Author(s)</th><td>Chatfield, Chris</td></tr>
            <tr><th>Year</th><td>2003</td></tr>
            <tr><th>ISBN</th><td>978-1-58488-317-3</td></tr>
            <tr><td colspan="2">footer</td></tr>
        </table></body></html>"#;

        let fields = extract_html(html, "https://catalog.example.org/item/2").unwrap();
        assert_eq!(fields.title, Field::Known("The Analysis of Time Series".to_string()));
        assert_eq!(fields.year, Field::Known("2003".to_string()));
        assert_eq!(
            fields.isbns,
            Field::Known(vec!["978-1-58488-317-3".to_string()])
        );
        assert_eq!(fields.doi, Field::Unknown);
    }

    #[test]
    fn page_without_title_is_rejected() {
        let html = r#"<html><head><title>Catalog</title>
            <meta name="citation_author" content="Nobody"></head></html>"#;
        let err = extract_html(html, "https://catalog.example.org/item/3").unwrap_err();
        assert_eq!(err, ExtractionError::MissingRequiredField("title"));
    }
}
