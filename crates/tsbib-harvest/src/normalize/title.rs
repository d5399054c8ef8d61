const LEADING_ARTICLES: &[&str] = &["a", "an", "the"];

/// Undo the escaping BibTeX export applies to special characters.
pub fn unescape_tex(text: &str) -> String {
    text.replace("\\&", "&")
        .replace("\\%", "%")
        .replace("\\$", "$")
        .replace("\\#", "#")
        .replace("\\_", "_")
}

/// Display form of a title: TeX grouping braces removed, escaped specials
/// unescaped, whitespace collapsed. Case is left alone.
pub fn clean_title(title: &str) -> String {
    unescape_tex(title)
        .chars()
        .filter(|c| *c != '{' && *c != '}')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Comparison key: lowercase, punctuation dropped, leading article removed.
pub fn title_key(title: &str) -> String {
    let lowercase = clean_title(title).to_lowercase();
    let cleaned: String = lowercase
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.len() > 1 && LEADING_ARTICLES.contains(&words[0]) {
        words.remove(0);
    }
    words.join(" ")
}
