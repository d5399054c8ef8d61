use once_cell::sync::Lazy;
use regex::Regex;
use tsbib_core::{EntryType, SourceFormat};

static DOCTORAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(ph\.?\s?d|doctoral|doctor of)\b").expect("valid regex")
});
static THESIS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(thesis|dissertation|master'?s)\b").expect("valid regex")
});
static BOOK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(handbook|textbook|manual|guide|introduction to|principles of)\b")
        .expect("valid regex")
});

/// Entry type from a source-declared document type (CrossRef `type`,
/// `dc.type`). Unrecognized hints give no answer.
pub fn type_from_hint(hint: &str) -> Option<EntryType> {
    let entry_type = match hint.trim().to_ascii_lowercase().as_str() {
        "journal-article" | "article" | "journal article" => EntryType::Article,
        "book" | "monograph" | "edited-book" | "reference-book" | "book-set" => EntryType::Book,
        "book-chapter" | "book-section" | "book-part" => EntryType::InCollection,
        "proceedings-article" | "conference paper" | "conference" => EntryType::InProceedings,
        "dissertation" | "thesis" | "phdthesis" => EntryType::PhdThesis,
        "report" | "report-component" | "technical report" => EntryType::TechReport,
        _ => return None,
    };
    Some(entry_type)
}

/// Type hint first, then title and abstract wording, then the source's
/// usual content.
pub fn classify(
    hint: Option<&str>,
    title: &str,
    abstract_text: Option<&str>,
    format: SourceFormat,
) -> EntryType {
    if let Some(entry_type) = hint.and_then(type_from_hint) {
        return entry_type;
    }

    let text = format!("{title} {}", abstract_text.unwrap_or_default());
    if THESIS.is_match(&text) || DOCTORAL.is_match(&text) {
        return if DOCTORAL.is_match(&text) {
            EntryType::PhdThesis
        } else {
            EntryType::MastersThesis
        };
    }
    if BOOK.is_match(&text) {
        return EntryType::Book;
    }

    match format {
        SourceFormat::ArxivAtom => EntryType::Misc,
        SourceFormat::CrossrefJson => EntryType::Article,
        SourceFormat::InternetArchiveJson | SourceFormat::Html => EntryType::Book,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_wins() {
        assert_eq!(
            classify(
                Some("proceedings-article"),
                "A Handbook of Forecasting",
                None,
                SourceFormat::CrossrefJson
            ),
            EntryType::InProceedings
        );
    }

    #[test]
    fn wording_before_source_default() {
        assert_eq!(
            classify(
                None,
                "Nonlinear time series models",
                Some("A dissertation submitted for the degree of Doctor of Philosophy"),
                SourceFormat::InternetArchiveJson
            ),
            EntryType::PhdThesis
        );
        assert_eq!(
            classify(
                Some("posted-content"),
                "Introduction to Time Series and Forecasting",
                None,
                SourceFormat::ArxivAtom
            ),
            EntryType::Book
        );
        assert_eq!(
            classify(None, "Seasonal adjustment, a master's thesis", None, SourceFormat::Html),
            EntryType::MastersThesis
        );
    }

    #[test]
    fn source_default() {
        assert_eq!(
            classify(None, "Temporal Fusion Transformers", None, SourceFormat::ArxivAtom),
            EntryType::Misc
        );
        assert_eq!(
            classify(None, "Time series analysis", None, SourceFormat::InternetArchiveJson),
            EntryType::Book
        );
    }

    #[test]
    fn words_need_boundaries() {
        // "guidelines" is not "guide"
        assert_eq!(
            classify(None, "Reporting guidelines for forecasts", None, SourceFormat::CrossrefJson),
            EntryType::Article
        );
    }
}
