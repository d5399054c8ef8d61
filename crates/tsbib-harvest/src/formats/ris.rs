use tsbib_core::{Author, Citation, EntryType, IdScheme};

fn entry_type_to_ris(entry_type: &EntryType) -> &'static str {
    match entry_type {
        EntryType::Article => "JOUR",
        EntryType::Book => "BOOK",
        EntryType::InBook | EntryType::InCollection => "CHAP",
        EntryType::InProceedings => "CONF",
        EntryType::PhdThesis | EntryType::MastersThesis => "THES",
        EntryType::TechReport => "RPRT",
        EntryType::Unpublished => "UNPB",
        EntryType::Misc | EntryType::Other(_) => "GEN",
    }
}

/// Venue tag: journal name for articles, secondary title otherwise.
fn venue_tag(entry_type: &EntryType) -> &'static str {
    match entry_type {
        EntryType::Article => "JO",
        _ => "T2",
    }
}

fn push_line(lines: &mut Vec<String>, tag: &str, value: Option<&str>) {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return;
    };
    lines.push(format!("{tag}  - {value}"));
}

/// `Last, First, Suffix`, the RIS name layout.
fn ris_name(author: &Author) -> String {
    let mut name = author.surname.clone();
    if let Some(given) = &author.given {
        name.push_str(", ");
        name.push_str(given);
    }
    if let Some(suffix) = &author.suffix {
        if author.given.is_none() {
            name.push(',');
        }
        name.push_str(", ");
        name.push_str(suffix);
    }
    name
}

/// One RIS record terminated by `ER  -` and a blank line.
pub fn generate_ris(citation: &Citation) -> String {
    let mut lines = vec![format!("TY  - {}", entry_type_to_ris(&citation.entry_type))];

    push_line(&mut lines, "TI", Some(&citation.title));
    for author in &citation.authors {
        push_line(&mut lines, "AU", Some(&ris_name(author)));
    }
    for editor in &citation.editors {
        push_line(&mut lines, "ED", Some(&ris_name(editor)));
    }
    push_line(
        &mut lines,
        "PY",
        citation.year.map(|y| y.to_string()).as_deref(),
    );
    push_line(
        &mut lines,
        venue_tag(&citation.entry_type),
        citation.venue.as_deref(),
    );
    push_line(&mut lines, "PB", citation.publisher.as_deref());
    push_line(&mut lines, "CY", citation.address.as_deref());
    push_line(&mut lines, "ET", citation.edition.as_deref());
    push_line(&mut lines, "VL", citation.volume.as_deref());
    push_line(&mut lines, "IS", citation.number.as_deref());

    if let Some(pages) = citation.pages.as_deref() {
        match pages.split_once('-') {
            Some((start, end)) => {
                push_line(&mut lines, "SP", Some(start));
                push_line(&mut lines, "EP", Some(end.trim_start_matches('-')));
            }
            None => push_line(&mut lines, "SP", Some(pages)),
        }
    }

    for isbn in citation.identifiers_of(IdScheme::Isbn) {
        push_line(&mut lines, "SN", Some(&isbn.value));
    }
    push_line(
        &mut lines,
        "DO",
        citation.identifier(IdScheme::Doi).map(|id| id.value.as_str()),
    );
    push_line(&mut lines, "UR", citation.url.as_deref());
    push_line(&mut lines, "AB", citation.abstract_text.as_deref());
    if let Some(keywords) = citation.keywords.as_deref() {
        for keyword in keywords.split([',', ';']) {
            push_line(&mut lines, "KW", Some(keyword));
        }
    }
    push_line(&mut lines, "N1", citation.note.as_deref());

    lines.push("ER  -".to_string());
    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsbib_core::ExternalId;

    #[test]
    fn article_record() {
        let mut citation = Citation::new("Spectral Analysis of Time Series");
        citation.entry_type = EntryType::Article;
        citation.authors = vec![Author::new("Brockwell", Some("Peter J.".to_string()))];
        citation.year = Some(1980);
        citation.venue = Some("Journal of Time Series Analysis".to_string());
        citation.pages = Some("93--110".to_string());
        citation.keywords = Some("spectra, ARMA".to_string());
        citation
            .identifiers
            .insert(ExternalId::new(IdScheme::Doi, "10.1111/j.1467-9892.1980.tb00297.x"));

        let ris = generate_ris(&citation);
        assert_eq!(
            ris,
            "TY  - JOUR\n\
             TI  - Spectral Analysis of Time Series\n\
             AU  - Brockwell, Peter J.\n\
             PY  - 1980\n\
             JO  - Journal of Time Series Analysis\n\
             SP  - 93\n\
             EP  - 110\n\
             DO  - 10.1111/j.1467-9892.1980.tb00297.x\n\
             KW  - spectra\n\
             KW  - ARMA\n\
             ER  -\n"
        );
    }

    #[test]
    fn suffix_goes_last() {
        let engle = Author::new("Engle", Some("Robert F.".to_string()))
            .with_suffix(Some("Jr.".to_string()));
        assert_eq!(ris_name(&engle), "Engle, Robert F., Jr.");
        let bare = Author::new("Engle", None).with_suffix(Some("Jr.".to_string()));
        assert_eq!(ris_name(&bare), "Engle,, Jr.");
    }

    #[test]
    fn unknown_type_is_generic() {
        let mut citation = Citation::new("M4 data");
        citation.entry_type = EntryType::Other("dataset".to_string());
        assert!(generate_ris(&citation).starts_with("TY  - GEN\n"));
    }
}
