use serde::Deserialize;

use super::fields::{Extraction, Field, RawFields};
use crate::error::ExtractionError;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchDocs,
}

#[derive(Debug, Deserialize)]
struct SearchDocs {
    #[serde(default)]
    docs: Vec<ArchiveDoc>,
}

/// archive.org returns most metadata fields as either a string or a list.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
    Number(i64),
    #[default]
    Empty,
}

impl OneOrMany {
    fn first(&self) -> Option<String> {
        match self {
            OneOrMany::One(s) => Some(s.clone()),
            OneOrMany::Many(v) => v.first().cloned(),
            OneOrMany::Number(n) => Some(n.to_string()),
            OneOrMany::Empty => None,
        }
    }

    fn all(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s.clone()],
            OneOrMany::Many(v) => v.clone(),
            OneOrMany::Number(n) => vec![n.to_string()],
            OneOrMany::Empty => Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArchiveDoc {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    title: OneOrMany,
    #[serde(default)]
    creator: OneOrMany,
    #[serde(default)]
    year: OneOrMany,
    #[serde(default)]
    date: OneOrMany,
    #[serde(default)]
    description: OneOrMany,
    #[serde(default)]
    publisher: OneOrMany,
    #[serde(default)]
    isbn: OneOrMany,
    #[serde(default)]
    subject: OneOrMany,
}

/// Documents of an archive.org advanced search response.
pub fn extract_archive(body: &str) -> Result<Extraction, ExtractionError> {
    let parsed: SearchResponse = serde_json::from_str(body)
        .map_err(|e| ExtractionError::Malformed(format!("invalid archive.org json: {e}")))?;

    Ok(Extraction::from_entries(
        parsed.response.docs.into_iter().map(doc_fields).collect(),
    ))
}

fn doc_fields(doc: ArchiveDoc) -> RawFields {
    let url = doc
        .identifier
        .as_deref()
        .map(|id| format!("https://archive.org/details/{id}"));

    RawFields {
        title: Field::text(doc.title.first().as_deref()),
        authors: Field::list(doc.creator.all()),
        year: Field::text(doc.year.first().or_else(|| doc.date.first()).as_deref()),
        publisher: Field::text(doc.publisher.first().as_deref()),
        abstract_text: Field::text(doc.description.first().as_deref()),
        url: Field::text(url.as_deref()),
        isbns: Field::list(doc.isbn.all()),
        keywords: Field::list(doc.subject.all()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_string_or_list_fields() {
        let body = r#"{
            "responseHeader": {"status": 0},
            "response": {"numFound": 2, "start": 0, "docs": [
                {
                    "identifier": "timeseriesanalys0000boxg",
                    "title": "Time series analysis: forecasting and control",
                    "creator": ["Box, George E. P", "Jenkins, Gwilym M"],
                    "year": 1976,
                    "description": ["Revised edition", "Includes index"]
                },
                {
                    "identifier": "analysisoftimese0000chat",
                    "title": "The analysis of time series",
                    "creator": "Chatfield, Christopher",
                    "year": "1984"
                }
            ]}
        }"#;

        let extraction = extract_archive(body).unwrap();
        assert_eq!(extraction.records.len(), 2);

        let box_jenkins = &extraction.records[0];
        assert_eq!(box_jenkins.year, Field::Known("1976".to_string()));
        assert_eq!(
            box_jenkins.authors,
            Field::Known(vec![
                "Box, George E. P".to_string(),
                "Jenkins, Gwilym M".to_string()
            ])
        );
        assert_eq!(
            box_jenkins.abstract_text,
            Field::Known("Revised edition".to_string())
        );
        assert_eq!(
            box_jenkins.url,
            Field::Known("https://archive.org/details/timeseriesanalys0000boxg".to_string())
        );

        let chatfield = &extraction.records[1];
        assert_eq!(
            chatfield.authors,
            Field::Known(vec!["Chatfield, Christopher".to_string()])
        );
    }

    #[test]
    fn doc_without_title_is_rejected() {
        let body = r#"{"response": {"docs": [{"identifier": "x"}]}}"#;
        let extraction = extract_archive(body).unwrap();
        assert!(extraction.records.is_empty());
        assert_eq!(extraction.rejected.len(), 1);
    }
}
