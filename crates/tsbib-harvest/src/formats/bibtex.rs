use std::collections::HashMap;

use tsbib_core::{Author, Citation, IdScheme};

use crate::error::{HarvestError, Result};
use crate::normalize::{clean_title, generate_cite_key};

/// One parsed `@type{key, ...}` entry. Field names are lowercased, values
/// have macros expanded, concatenations joined and whitespace collapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    pub entry_type: String,
    pub key: String,
    pub fields: Vec<(String, String)>,
    /// Line of the `@` that opened the entry.
    pub line: usize,
}

impl BibEntry {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

// ─── Parsing ───────────────────────────────────────────────

const MONTHS: &[(&str, &str)] = &[
    ("jan", "January"),
    ("feb", "February"),
    ("mar", "March"),
    ("apr", "April"),
    ("may", "May"),
    ("jun", "June"),
    ("jul", "July"),
    ("aug", "August"),
    ("sep", "September"),
    ("oct", "October"),
    ("nov", "November"),
    ("dec", "December"),
];

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    strings: HashMap<String, String>,
}

impl Parser {
    fn new(input: &str) -> Self {
        let strings = MONTHS
            .iter()
            .map(|(abbr, name)| (abbr.to_string(), name.to_string()))
            .collect();
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            strings,
        }
    }

    fn error(&self, message: impl Into<String>) -> HarvestError {
        HarvestError::BibtexParse {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    fn identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '+' | '/' | '\'') {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        ident
    }

    /// Content of a `{...}` group after its opening brace, nested braces kept.
    fn braced(&mut self) -> Result<String> {
        let mut depth = 1usize;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                }
                _ => {}
            }
            out.push(c);
        }
        Err(self.error("unbalanced braces"))
    }

    fn quoted(&mut self) -> Result<String> {
        let mut depth = 0usize;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '"' if depth == 0 => return Ok(out),
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                _ => {}
            }
            out.push(c);
        }
        Err(self.error("unterminated quoted value"))
    }

    /// `part # part # ...` where a part is braced, quoted, a number or a
    /// macro name.
    fn value(&mut self) -> Result<String> {
        let mut value = String::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('{') => {
                    self.bump();
                    value.push_str(&self.braced()?);
                }
                Some('"') => {
                    self.bump();
                    value.push_str(&self.quoted()?);
                }
                Some(c) if c.is_alphanumeric() => {
                    let ident = self.identifier();
                    if ident.chars().all(|c| c.is_ascii_digit()) {
                        value.push_str(&ident);
                    } else {
                        let expanded = self
                            .strings
                            .get(&ident.to_lowercase())
                            .cloned()
                            .unwrap_or(ident);
                        value.push_str(&expanded);
                    }
                }
                Some(c) => return Err(self.error(format!("unexpected '{c}' in value"))),
                None => return Err(self.error("value cut off by end of input")),
            }
            self.skip_whitespace();
            if self.peek() == Some('#') {
                self.bump();
            } else {
                break;
            }
        }
        Ok(value.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    fn skip_group(&mut self, close: char) -> Result<()> {
        if close == '}' {
            self.braced().map(|_| ())
        } else {
            while let Some(c) = self.bump() {
                if c == ')' {
                    return Ok(());
                }
            }
            Err(self.error("unterminated entry"))
        }
    }

    fn open(&mut self) -> Result<char> {
        self.skip_whitespace();
        match self.bump() {
            Some('{') => Ok('}'),
            Some('(') => Ok(')'),
            Some(c) => Err(self.error(format!("expected '{{' or '(', found '{c}'"))),
            None => Err(self.error("entry cut off by end of input")),
        }
    }

    fn string_definition(&mut self, close: char) -> Result<()> {
        self.skip_whitespace();
        let name = self.identifier().to_lowercase();
        if name.is_empty() {
            return Err(self.error("@string without a name"));
        }
        self.expect('=')?;
        let value = self.value()?;
        self.expect(close)?;
        self.strings.insert(name, value);
        Ok(())
    }

    fn entry(&mut self, entry_type: String, close: char, line: usize) -> Result<BibEntry> {
        self.skip_whitespace();
        let mut key = String::new();
        while let Some(c) = self.peek() {
            if c == ',' || c == close || c.is_whitespace() {
                break;
            }
            key.push(c);
            self.bump();
        }

        let mut entry = BibEntry {
            entry_type,
            key,
            fields: Vec::new(),
            line,
        };

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(c) if c == close => {
                    self.bump();
                    return Ok(entry);
                }
                Some(_) => {
                    let name = self.identifier().to_lowercase();
                    if name.is_empty() {
                        return Err(self.error(format!(
                            "expected a field name in entry '{}'",
                            entry.key
                        )));
                    }
                    self.expect('=')?;
                    let value = self.value()?;
                    if entry.get(&name).is_none() {
                        entry.fields.push((name, value));
                    }
                    self.skip_whitespace();
                    match self.peek() {
                        Some(',') => {
                            self.bump();
                        }
                        Some(c) if c == close => {}
                        Some(c) => {
                            return Err(self.error(format!(
                                "expected ',' after field in entry '{}', found '{c}'",
                                entry.key
                            )));
                        }
                        None => return Err(self.error("entry cut off by end of input")),
                    }
                }
                None => return Err(self.error("entry cut off by end of input")),
            }
        }
    }

    /// After an `@`: the lowercased entry type when a type name and an
    /// opening delimiter follow. Otherwise the position is restored and the
    /// `@` is treated as commentary.
    fn entry_start(&mut self) -> Option<String> {
        let (pos, line) = (self.pos, self.line);
        self.skip_whitespace();
        let entry_type = self.identifier().to_lowercase();
        let opens = {
            self.skip_whitespace();
            matches!(self.peek(), Some('{' | '('))
        };
        if !entry_type.is_empty() && (opens || entry_type == "comment") {
            return Some(entry_type);
        }
        self.pos = pos;
        self.line = line;
        None
    }

    fn parse(mut self) -> Result<Vec<BibEntry>> {
        let mut entries = Vec::new();
        // Text outside entries is commentary, stray `@`s included.
        let mut previous = None;
        while let Some(c) = self.bump() {
            let after_word = previous.is_some_and(char::is_alphanumeric);
            previous = Some(c);
            if c != '@' || after_word {
                continue;
            }
            let line = self.line;
            let Some(entry_type) = self.entry_start() else {
                continue;
            };
            match entry_type.as_str() {
                "comment" => {
                    self.skip_whitespace();
                    if let Some(open) = self.peek().filter(|c| *c == '{' || *c == '(') {
                        self.bump();
                        self.skip_group(if open == '{' { '}' } else { ')' })?;
                    }
                }
                "preamble" => {
                    let close = self.open()?;
                    self.skip_group(close)?;
                }
                "string" => {
                    let close = self.open()?;
                    self.string_definition(close)?;
                }
                _ => {
                    let close = self.open()?;
                    entries.push(self.entry(entry_type, close, line)?);
                }
            }
        }
        Ok(entries)
    }
}

/// Parse BibTeX text. Unknown entry types are kept as they are.
pub fn parse_bibtex(input: &str) -> Result<Vec<BibEntry>> {
    Parser::new(input).parse()
}

// ─── Generation ────────────────────────────────────────────

/// Fields that must be written verbatim.
const VERBATIM_FIELDS: &[&str] = &["url", "doi", "eprint", "isbn", "archiveprefix"];

pub fn escape_bibtex(s: &str) -> String {
    s.replace('&', "\\&")
        .replace('_', "\\_")
        .replace('$', "\\$")
        .replace('%', "\\%")
        .replace('#', "\\#")
}

fn author_field(authors: &[Author], truncated: bool) -> Option<String> {
    if authors.is_empty() {
        return None;
    }
    let mut names = authors
        .iter()
        .map(|author| {
            if author.given.is_none()
                && author.suffix.is_none()
                && author.surname.contains(char::is_whitespace)
            {
                format!("{{{}}}", author.surname)
            } else {
                author.display()
            }
        })
        .collect::<Vec<_>>();
    if truncated {
        names.push("others".to_string());
    }
    Some(names.join(" and "))
}

/// The TeX form of the title when it still describes `title`, escaped plain
/// text otherwise.
fn title_field(citation: &Citation) -> String {
    match &citation.title_tex {
        Some(tex) if clean_title(tex) == citation.title => tex.clone(),
        _ => escape_bibtex(&citation.title),
    }
}

/// Entry body under construction; remembers which fields were written so
/// `extra` never duplicates a canonical field.
struct EntryWriter<'a> {
    bib: String,
    written: Vec<&'a str>,
}

impl<'a> EntryWriter<'a> {
    fn field(&mut self, name: &'a str, value: Option<String>) {
        let value = value.map(|v| {
            if VERBATIM_FIELDS.contains(&name) {
                v
            } else {
                escape_bibtex(&v)
            }
        });
        self.raw(name, value);
    }

    /// Write a value that is already valid BibTeX.
    fn raw(&mut self, name: &'a str, value: Option<String>) {
        let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
            return;
        };
        if self.written.contains(&name) {
            return;
        }
        self.bib.push_str(&format!("  {name} = {{{value}}},\n"));
        self.written.push(name);
    }
}

/// One BibTeX entry with a fixed field order; `extra` fields follow in name
/// order.
pub fn generate_bibtex(citation: &Citation) -> String {
    let cite_key = citation
        .cite_key
        .clone()
        .filter(|key| !key.is_empty())
        .unwrap_or_else(|| generate_cite_key(citation));
    let mut entry = EntryWriter {
        bib: format!("@{}{{{},\n", citation.entry_type, cite_key),
        written: Vec::new(),
    };

    let isbns = citation
        .identifiers_of(IdScheme::Isbn)
        .map(|id| id.value.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let arxiv = citation.identifier(IdScheme::Arxiv).map(|id| id.value.clone());

    entry.raw("title", Some(title_field(citation)));
    entry.field("author", author_field(&citation.authors, citation.authors_truncated));
    entry.field("editor", author_field(&citation.editors, citation.editors_truncated));
    entry.field("year", citation.year.map(|y| y.to_string()));
    entry.field("month", citation.month.clone());
    entry.field(citation.entry_type.venue_field(), citation.venue.clone());
    entry.field("publisher", citation.publisher.clone());
    entry.field("edition", citation.edition.clone());
    entry.field("series", citation.series.clone());
    entry.field("volume", citation.volume.clone());
    entry.field("number", citation.number.clone());
    entry.field("pages", citation.pages.clone());
    entry.field("address", citation.address.clone());
    entry.field("isbn", Some(isbns));
    entry.field(
        "doi",
        citation.identifier(IdScheme::Doi).map(|id| id.value.clone()),
    );
    if arxiv.is_some() {
        entry.field("eprint", arxiv);
        entry.field("archiveprefix", Some("arXiv".to_string()));
    }
    entry.field("url", citation.url.clone());
    entry.field("keywords", citation.keywords.clone());
    entry.field("abstract", citation.abstract_text.clone());
    entry.field("note", citation.note.clone());

    for (name, value) in &citation.extra {
        entry.field(name, Some(value.clone()));
    }

    let mut bib = entry.bib;
    bib.push_str("}\n");
    bib
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsbib_core::{EntryType, ExternalId};

    #[test]
    fn parses_entry_with_mixed_delimiters() {
        let input = r#"
Some commentary before the first entry.

@Book{knuth1997,
  Title     = {The Art of {Computer} Programming},
  author    = "Knuth, Donald E.",
  year      = 1997,
  month     = jan,
  isbn      = {0-201-89683-4}
}
"#;
        let entries = parse_bibtex(input).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.entry_type, "book");
        assert_eq!(entry.key, "knuth1997");
        assert_eq!(entry.line, 4);
        assert_eq!(entry.get("title"), Some("The Art of {Computer} Programming"));
        assert_eq!(entry.get("author"), Some("Knuth, Donald E."));
        assert_eq!(entry.get("year"), Some("1997"));
        assert_eq!(entry.get("month"), Some("January"));
    }

    #[test]
    fn string_macros_and_concatenation() {
        let input = r#"
@string{jtsa = "Journal of Time Series Analysis"}
@comment{ ignored {nested} }
@preamble{ "\newcommand{\noop}[1]{}" }
@article{granger1980,
  title = {Long memory relationships
           and the aggregation of dynamic models},
  journal = jtsa # ", Special Issue",
  year = {1980},
}
@dataset(ts2020, title = {M4 Competition Data})
"#;
        let entries = parse_bibtex(input).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].get("title"),
            Some("Long memory relationships and the aggregation of dynamic models")
        );
        assert_eq!(
            entries[0].get("journal"),
            Some("Journal of Time Series Analysis, Special Issue")
        );
        assert_eq!(entries[1].entry_type, "dataset");
        assert_eq!(entries[1].get("title"), Some("M4 Competition Data"));
    }

    #[test]
    fn reports_line_of_error() {
        let input = "@book{a,\n  title = {ok},\n  year = {1997\n";
        match parse_bibtex(input) {
            Err(HarvestError::BibtexParse { line, .. }) => assert!(line >= 3),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn stray_at_signs_are_commentary() {
        let input = "% maintained by jane.doe@example.org (weekly)\n\
                     % rates: 3 @ 5 EUR\n\
                     @book{box1970, title = {Time Series Analysis}, year = 1970}\n\
                     @ the end\n";
        let entries = parse_bibtex(input).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "box1970");
        assert_eq!(entries[0].line, 3);
    }

    #[test]
    fn missing_comma_is_an_error() {
        let input = "@book{a, title = {One} year = {1997}}";
        assert!(matches!(
            parse_bibtex(input),
            Err(HarvestError::BibtexParse { line: 1, .. })
        ));
    }

    #[test]
    fn generates_fixed_order() {
        let mut citation = Citation::new("Forecasting: Principles & Practice");
        citation.entry_type = EntryType::Book;
        citation.cite_key = Some("hyndman2018forecasting".to_string());
        citation.authors = vec![
            Author::new("Hyndman", Some("Rob J.".to_string())),
            Author::new("Athanasopoulos", Some("George".to_string())),
        ];
        citation.year = Some(2018);
        citation.publisher = Some("OTexts".to_string());
        citation.url = Some("https://otexts.com/fpp2/?a_b".to_string());
        citation
            .identifiers
            .insert(ExternalId::new(IdScheme::Isbn, "9780987507112"));
        citation
            .extra
            .insert("language".to_string(), "English".to_string());

        let bib = generate_bibtex(&citation);
        assert_eq!(
            bib,
            "@book{hyndman2018forecasting,\n\
             \x20 title = {Forecasting: Principles \\& Practice},\n\
             \x20 author = {Hyndman, Rob J. and Athanasopoulos, George},\n\
             \x20 year = {2018},\n\
             \x20 publisher = {OTexts},\n\
             \x20 isbn = {9780987507112},\n\
             \x20 url = {https://otexts.com/fpp2/?a_b},\n\
             \x20 language = {English},\n\
             }\n"
        );
    }

    #[test]
    fn writes_tex_title_suffix_and_others() {
        let mut citation = Citation::new("DeepAR: Probabilistic Forecasting with ARIMA baselines");
        citation.title_tex =
            Some("{DeepAR}: Probabilistic Forecasting with {ARIMA} baselines".to_string());
        citation.authors = vec![
            Author::new("Engle", Some("Robert F.".to_string())).with_suffix(Some("Jr.".to_string())),
            Author::new("Granger", Some("C. W. J.".to_string())),
        ];
        citation.authors_truncated = true;

        let bib = generate_bibtex(&citation);
        assert!(
            bib.contains("title = {{DeepAR}: Probabilistic Forecasting with {ARIMA} baselines}"),
            "{bib}"
        );
        assert!(
            bib.contains("author = {Engle, Jr., Robert F. and Granger, C. W. J. and others}"),
            "{bib}"
        );
    }

    #[test]
    fn stale_tex_title_is_not_written() {
        let mut citation = Citation::new("Forecasting & Control");
        citation.title_tex = Some("{Something} Else".to_string());
        let bib = generate_bibtex(&citation);
        assert!(bib.contains("title = {Forecasting \\& Control}"), "{bib}");
    }

    #[test]
    fn corporate_authors_are_braced() {
        let mut citation = Citation::new("Guide to Climatological Practices");
        citation.authors = vec![Author::new("World Meteorological Organization", None)];
        let bib = generate_bibtex(&citation);
        assert!(bib.contains("author = {{World Meteorological Organization}}"));
        assert!(bib.starts_with("@misc{organizationguide,"), "{bib}");
    }
}
