use tsbib_core::Citation;

use super::title::title_key;

/// `<surname><year><first title word of 3+ letters>`, lowercase ASCII.
/// Authorless works use `unknown`; an unknown year is left out.
pub fn generate_cite_key(citation: &Citation) -> String {
    let surname = citation
        .authors
        .first()
        .or_else(|| citation.editors.first())
        .map(|author| {
            author
                .surname
                .split_whitespace()
                .last()
                .unwrap_or_default()
                .chars()
                .filter(char::is_ascii_alphabetic)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let year = citation.year.map(|y| y.to_string()).unwrap_or_default();

    let word = title_key(&citation.title)
        .split_whitespace()
        .find(|w| w.len() >= 3 && w.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or_default()
        .to_string();

    format!("{surname}{year}{word}")
}
