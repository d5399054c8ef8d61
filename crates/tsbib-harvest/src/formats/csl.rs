use serde::Serialize;
use tsbib_core::{Author, BibliographicRecord, Citation, EntryType, IdScheme};

/// CSL-JSON item, the interchange format of Zotero and citeproc.
#[derive(Debug, Clone, Serialize)]
pub struct CslItem {
    pub id: String,
    #[serde(rename = "type")]
    pub csl_type: &'static str,
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<CslName>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub editor: Vec<CslName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued: Option<CslDate>,
    #[serde(rename = "container-title", skip_serializing_if = "Option::is_none")]
    pub container_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(rename = "publisher-place", skip_serializing_if = "Option::is_none")]
    pub publisher_place: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edition: Option<String>,
    #[serde(rename = "DOI", skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(rename = "ISBN", skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(rename = "URL", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CslName {
    pub family: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CslDate {
    #[serde(rename = "date-parts")]
    pub date_parts: Vec<Vec<i32>>,
}

fn entry_type_to_csl(entry_type: &EntryType) -> &'static str {
    match entry_type {
        EntryType::Article => "article-journal",
        EntryType::Book => "book",
        EntryType::InBook | EntryType::InCollection => "chapter",
        EntryType::InProceedings => "paper-conference",
        EntryType::PhdThesis | EntryType::MastersThesis => "thesis",
        EntryType::TechReport => "report",
        EntryType::Unpublished => "manuscript",
        EntryType::Misc | EntryType::Other(_) => "document",
    }
}

fn names(authors: &[Author]) -> Vec<CslName> {
    authors
        .iter()
        .map(|a| CslName {
            family: a.surname.clone(),
            given: a.given.clone(),
            suffix: a.suffix.clone(),
        })
        .collect()
}

pub fn citation_to_csl_item(fallback_id: &str, citation: &Citation) -> CslItem {
    let isbn = citation
        .identifiers_of(IdScheme::Isbn)
        .map(|id| id.value.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    CslItem {
        id: citation
            .cite_key
            .clone()
            .unwrap_or_else(|| fallback_id.to_string()),
        csl_type: entry_type_to_csl(&citation.entry_type),
        title: citation.title.clone(),
        author: names(&citation.authors),
        editor: names(&citation.editors),
        issued: citation.year.map(|y| CslDate {
            date_parts: vec![vec![y]],
        }),
        container_title: citation.venue.clone(),
        publisher: citation.publisher.clone(),
        publisher_place: citation.address.clone(),
        volume: citation.volume.clone(),
        issue: citation.number.clone(),
        page: citation.pages.as_deref().map(|p| p.replace("--", "-")),
        edition: citation.edition.clone(),
        doi: citation.identifier(IdScheme::Doi).map(|id| id.value.clone()),
        isbn: (!isbn.is_empty()).then_some(isbn),
        url: citation.url.clone(),
        abstract_text: citation.abstract_text.clone(),
    }
}

/// A pretty-printed CSL-JSON array.
pub fn generate_csl_json(records: &[&BibliographicRecord]) -> serde_json::Result<String> {
    let items: Vec<CslItem> = records
        .iter()
        .map(|r| citation_to_csl_item(&r.id.to_string(), &r.citation))
        .collect();
    serde_json::to_string_pretty(&items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn maps_book_fields() {
        let mut citation = Citation::new("Time Series Analysis");
        citation.entry_type = EntryType::Book;
        citation.cite_key = Some("hamilton1994time".to_string());
        citation.authors = vec![Author::new("Hamilton", Some("James D.".to_string()))];
        citation.year = Some(1994);
        citation.publisher = Some("Princeton University Press".to_string());

        let item = citation_to_csl_item("ignored", &citation);
        let json: Value = serde_json::to_value(&item).unwrap();
        assert_eq!(json["id"], "hamilton1994time");
        assert_eq!(json["type"], "book");
        assert_eq!(json["author"][0]["family"], "Hamilton");
        assert_eq!(json["issued"]["date-parts"][0][0], 1994);
        assert!(json.get("DOI").is_none());
    }
}
