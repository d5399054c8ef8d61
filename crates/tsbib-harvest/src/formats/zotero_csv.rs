use tsbib_core::{BibliographicRecord, EntryType, IdScheme};

use crate::error::ExportError;

const HEADER: &[&str] = &[
    "Item Type",
    "Title",
    "Author",
    "Year",
    "URL",
    "Abstract",
    "DOI",
    "Publication Title",
    "Publisher",
    "Volume",
    "Issue",
    "Pages",
    "ISBN",
    "Date Added",
    "Manual Tags",
];

fn zotero_item_type(entry_type: &EntryType) -> &'static str {
    match entry_type {
        EntryType::Article => "journalArticle",
        EntryType::Book => "book",
        EntryType::InBook | EntryType::InCollection => "bookSection",
        EntryType::InProceedings => "conferencePaper",
        EntryType::PhdThesis | EntryType::MastersThesis => "thesis",
        EntryType::TechReport => "report",
        EntryType::Unpublished => "manuscript",
        EntryType::Misc | EntryType::Other(_) => "document",
    }
}

/// Zotero's CSV import layout; authors are `Surname, Given` joined by `; `.
pub fn generate_zotero_csv(records: &[&BibliographicRecord]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;

    for record in records {
        let c = &record.citation;
        let authors = c
            .authors
            .iter()
            .map(|a| a.display())
            .collect::<Vec<_>>()
            .join("; ");
        let isbns = c
            .identifiers_of(IdScheme::Isbn)
            .map(|id| id.value.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let tags = c
            .keywords
            .as_deref()
            .map(|k| {
                k.split([',', ';'])
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .unwrap_or_default();
        let year = c.year.map(|y| y.to_string()).unwrap_or_default();
        let added = record.created_at.format("%Y-%m-%d %H:%M:%S").to_string();

        writer.write_record([
            zotero_item_type(&c.entry_type),
            c.title.as_str(),
            authors.as_str(),
            year.as_str(),
            c.url.as_deref().unwrap_or_default(),
            c.abstract_text.as_deref().unwrap_or_default(),
            c.identifier(IdScheme::Doi)
                .map(|id| id.value.as_str())
                .unwrap_or_default(),
            c.venue.as_deref().unwrap_or_default(),
            c.publisher.as_deref().unwrap_or_default(),
            c.volume.as_deref().unwrap_or_default(),
            c.number.as_deref().unwrap_or_default(),
            c.pages.as_deref().unwrap_or_default(),
            isbns.as_str(),
            added.as_str(),
            tags.as_str(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))?;
    String::from_utf8(bytes)
        .map_err(|e| ExportError::Csv(csv::Error::from(std::io::Error::other(e))))
}
