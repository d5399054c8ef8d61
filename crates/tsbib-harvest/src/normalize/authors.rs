use tsbib_core::Author;

const HONORIFICS: &[&str] = &["dr", "prof", "professor", "mr", "mrs", "ms", "sir", "dame"];
const SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv"];
const DEGREES: &[&str] = &["phd", "ph.d", "md"];
const PARTICLES: &[&str] = &[
    "von", "van", "de", "der", "den", "du", "da", "di", "del", "della", "la", "le", "ten", "ter",
];

fn bare(token: &str) -> String {
    token.trim_end_matches('.').to_ascii_lowercase()
}

fn is_honorific(token: &str) -> bool {
    HONORIFICS.contains(&bare(token).as_str())
}

fn is_suffix(token: &str) -> bool {
    SUFFIXES.contains(&bare(token).as_str())
}

fn is_degree(token: &str) -> bool {
    DEGREES.contains(&bare(token).as_str())
}

fn is_dropped(token: &str) -> bool {
    is_honorific(token) || is_degree(token)
}

/// Split `raw` on top-level separators, ignoring anything inside braces.
/// ` and ` always separates; `;` and `&` only in free text.
fn split_top_level(raw: &str, bibtex: bool) -> Vec<String> {
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b';' | b'&' if depth == 0 && !bibtex => {
                parts.push(text[start..i].to_string());
                start = i + 1;
            }
            b' ' if depth == 0 && bytes[i..].starts_with(b" and ") => {
                parts.push(text[start..i].to_string());
                i += " and ".len();
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(text[start..].to_string());

    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Free-text lists also use commas between whole names. A segment pair
/// `Surname, Given` stays together; comma lists of multi-word names split.
fn split_commas(piece: &str) -> Vec<String> {
    let segments: Vec<&str> = piece
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if segments.len() <= 1 {
        return vec![piece.to_string()];
    }
    let trailer = |s: &str| is_suffix(s) || is_degree(s);
    if segments.len() == 3 && (trailer(segments[1]) || trailer(segments[2])) {
        return vec![piece.to_string()];
    }
    if segments.len() == 2 && trailer(segments[1]) {
        return vec![piece.to_string()];
    }
    if segments.iter().all(|s| s.split_whitespace().count() > 1) {
        return segments.into_iter().map(str::to_string).collect();
    }
    if segments.len() % 2 == 0 {
        return segments
            .chunks(2)
            .map(|pair| format!("{}, {}", pair[0], pair[1]))
            .collect();
    }
    segments.into_iter().map(str::to_string).collect()
}

/// Names from a free-text author string such as `A. Smith & B. Jones` or
/// `Wu, Haixu; Xu, Jiehui`.
pub fn split_author_list(raw: &str) -> Vec<String> {
    split_top_level(raw, false)
        .iter()
        .flat_map(|piece| {
            if piece.starts_with('{') {
                vec![piece.clone()]
            } else {
                split_commas(piece)
            }
        })
        .collect()
}

/// Names of a BibTeX `author`/`editor` field. Only ` and ` separates names.
/// A trailing `others` is not a name; the flag reports it.
pub fn split_bibtex_names(raw: &str) -> (Vec<String>, bool) {
    let mut names = split_top_level(raw, true);
    let others = names
        .last()
        .is_some_and(|name| name.eq_ignore_ascii_case("others"));
    names.retain(|name| !name.eq_ignore_ascii_case("others"));
    (names, others)
}

fn strip_outer_braces(name: &str) -> Option<&str> {
    let inner = name.strip_prefix('{')?.strip_suffix('}')?;
    // `{A} and {B}` style strings are not a single braced group.
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(inner)
}

/// One name in either `Surname, Given`, `Surname, Suffix, Given` or
/// `Given Surname Suffix` order. A fully braced name is a corporate author
/// and is kept whole. Returns `None` when nothing usable is left after
/// stripping honorifics and degrees.
pub fn parse_name(raw: &str) -> Option<Author> {
    let raw = raw.trim().trim_end_matches([',', ';']).trim();
    if let Some(corporate) = strip_outer_braces(raw) {
        let corporate = corporate.trim();
        return (!corporate.is_empty()).then(|| Author::new(corporate, None));
    }

    if let Some((surname, rest)) = raw.split_once(',') {
        let mut suffix = None;
        let mut given = Vec::new();
        for part in rest.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if is_suffix(part) && suffix.is_none() {
                suffix = Some(part.to_string());
            } else if !is_degree(part) {
                given.push(part);
            }
        }
        let (given, trailing) = take_suffix(&given.join(" "));
        let suffix = suffix.or(trailing);
        // `Given Surname, Jr.`: nothing but a suffix follows the comma.
        if given.is_empty() && surname.split_whitespace().count() > 1 {
            return parse_natural(surname, suffix);
        }
        return author_from(strip_tokens(surname, is_honorific), given, suffix);
    }

    parse_natural(raw, None)
}

fn parse_natural(raw: &str, suffix: Option<String>) -> Option<Author> {
    let (rest, trailing) = take_suffix(raw);
    let suffix = suffix.or(trailing);
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    match tokens.as_slice() {
        [] => None,
        [only] => author_from(only.to_string(), String::new(), suffix),
        _ => {
            let split = tokens
                .iter()
                .enumerate()
                .skip(1)
                .find(|&(i, t)| i < tokens.len() - 1 && PARTICLES.contains(t))
                .map(|(i, _)| i)
                .unwrap_or(tokens.len() - 1);
            author_from(tokens[split..].join(" "), tokens[..split].join(" "), suffix)
        }
    }
}

/// Drop honorifics and degrees, and pull out the first generational suffix.
fn take_suffix(text: &str) -> (String, Option<String>) {
    let mut suffix = None;
    let mut kept = Vec::new();
    for token in text.split_whitespace().filter(|t| !is_dropped(t)) {
        if suffix.is_none() && is_suffix(token) {
            suffix = Some(token.trim_end_matches(',').to_string());
        } else {
            kept.push(token);
        }
    }
    (kept.join(" "), suffix)
}

fn strip_tokens(text: &str, drop: impl Fn(&str) -> bool) -> String {
    text.split_whitespace()
        .filter(|t| !drop(t))
        .collect::<Vec<_>>()
        .join(" ")
}

fn author_from(surname: String, given: String, suffix: Option<String>) -> Option<Author> {
    if !surname.chars().any(char::is_alphabetic) {
        return None;
    }
    let given = (!given.is_empty()).then_some(given);
    Some(Author::new(surname, given).with_suffix(suffix))
}
