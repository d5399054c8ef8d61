//! Duplicate detection and merging.
//!
//! A candidate first looks for a stored record holding any of its external
//! identifiers. Without one, it is scored against records of a nearby year
//! on title, author and year agreement; only a score at or above the merge
//! threshold merges. Ambiguous scores insert a new record.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;
use tsbib_core::{
    Author, BibliographicRecord, CandidateRecord, Citation, DedupConfig, ExternalId, IdScheme,
    LineageEntry, MatchKind, RecordId, RecordRepository,
};

use crate::error::{MergeConflict, Result};
use crate::normalize::title_key;

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No stored record describes this work.
    New,
    MergeInto { id: RecordId, matched_by: MatchKind },
    /// This exact input was absorbed before.
    Unchanged(RecordId),
}

/// Content fingerprint of a citation: SHA-256 over its canonical JSON.
/// Provenance is left out so re-fetching identical content is a no-op.
pub fn fingerprint(citation: &Citation) -> String {
    let canonical = serde_json::to_string(citation).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Default)]
pub struct DedupEngine {
    config: DedupConfig,
}

impl DedupEngine {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    pub fn resolve<R: RecordRepository>(
        &self,
        repo: &R,
        candidate: &CandidateRecord,
        fingerprint: &str,
    ) -> Result<Resolution> {
        if let Some(id) = repo.find_by_fingerprint(fingerprint)? {
            return Ok(Resolution::Unchanged(id));
        }

        let citation = &candidate.citation;
        let mut owners: BTreeMap<RecordId, IdScheme> = BTreeMap::new();
        let mut matched: Vec<ExternalId> = Vec::new();
        for id in &citation.identifiers {
            if let Some(owner) = repo.owner_of(id.scheme, &id.match_key())? {
                owners.entry(owner).or_insert(id.scheme);
                matched.push(id.clone());
            }
        }

        if owners.len() > 1 {
            return Err(MergeConflict {
                owners: owners.into_keys().collect(),
                identifiers: matched,
            }
            .into());
        }
        if let Some((id, scheme)) = owners.into_iter().next() {
            return Ok(Resolution::MergeInto {
                id,
                matched_by: MatchKind::Identifier { scheme },
            });
        }

        let cfg = &self.config;
        let pool = match citation.year {
            Some(year) if cfg.title_weight + cfg.author_weight < cfg.merge_threshold => {
                repo.near_year(year, 1)?
            }
            _ => repo.all()?,
        };

        // Pool is in creation order, so a strict `>` keeps the earliest
        // record among equal scores.
        let mut best: Option<(f64, &BibliographicRecord)> = None;
        for existing in &pool {
            let score = self.score(citation, &existing.citation);
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, existing));
            }
        }

        match best {
            Some((score, existing)) if score >= cfg.merge_threshold => Ok(Resolution::MergeInto {
                id: existing.id,
                matched_by: MatchKind::Similarity { score },
            }),
            Some((score, existing)) if score >= cfg.new_threshold => {
                debug!(
                    record_id = %existing.id,
                    score,
                    title = %citation.title,
                    "ambiguous similarity, keeping as a new record"
                );
                Ok(Resolution::New)
            }
            _ => Ok(Resolution::New),
        }
    }

    /// Weighted similarity in `[0, 1]`. Records carrying a different DOI or
    /// arXiv id describe different works and score zero.
    pub fn score(&self, candidate: &Citation, existing: &Citation) -> f64 {
        if conflicting_identifiers(candidate, existing) {
            return 0.0;
        }
        let cfg = &self.config;
        cfg.title_weight * self.title_score(&candidate.title, &existing.title)
            + cfg.author_weight * author_score(candidate, existing)
            + cfg.year_weight * year_score(candidate.year, existing.year)
    }

    fn title_score(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (title_key(a), title_key(b));
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }
        if a.len() < 5 || b.len() < 5 {
            return 0.0;
        }
        let similarity = strsim::normalized_levenshtein(&a, &b);
        if similarity >= self.config.title_similarity {
            similarity
        } else {
            0.0
        }
    }
}

fn conflicting_identifiers(a: &Citation, b: &Citation) -> bool {
    [IdScheme::Doi, IdScheme::Arxiv].iter().any(|scheme| {
        match (a.identifier(*scheme), b.identifier(*scheme)) {
            (Some(x), Some(y)) => x.match_key() != y.match_key(),
            _ => false,
        }
    })
}

/// Share of surnames in common, relative to the longer list.
fn author_score(a: &Citation, b: &Citation) -> f64 {
    if a.authors.is_empty() || b.authors.is_empty() {
        return 0.5;
    }
    let left: HashSet<String> = a.authors.iter().map(|x| x.surname_key()).collect();
    let right: HashSet<String> = b.authors.iter().map(|x| x.surname_key()).collect();
    let shared = left.intersection(&right).count();
    shared as f64 / left.len().max(right.len()) as f64
}

fn year_score(a: Option<i32>, b: Option<i32>) -> f64 {
    match (a, b) {
        (Some(x), Some(y)) if (x - y).abs() <= 1 => 1.0,
        (Some(_), Some(_)) => 0.0,
        _ => 0.5,
    }
}

fn backfill(slot: &mut Option<String>, incoming: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(incoming);
    }
}

fn richness(authors: &[Author]) -> usize {
    authors.iter().map(|a| a.richness()).sum()
}

/// Absorb `candidate` into `primary`. Known fields of the primary win;
/// unknown ones are filled from the candidate. The author list is replaced
/// only by a longer or richer one. Identifiers are unioned when the match
/// came from a shared identifier; otherwise only missing schemes are filled.
/// A single-valued scheme (DOI, arXiv) never gains a second value.
pub fn merge_into(
    primary: &mut BibliographicRecord,
    candidate: &CandidateRecord,
    matched_by: MatchKind,
    fingerprint: String,
) {
    let now = Utc::now();
    let target = &mut primary.citation;
    let incoming = &candidate.citation;

    if target.entry_type.is_generic() && !incoming.entry_type.is_generic() {
        target.entry_type = incoming.entry_type.clone();
    }

    let longer = |mine: &[Author], theirs: &[Author]| {
        theirs.len() > mine.len()
            || (theirs.len() == mine.len() && richness(theirs) > richness(mine))
    };
    if longer(&target.authors, &incoming.authors) {
        target.authors = incoming.authors.clone();
        target.authors_truncated = incoming.authors_truncated;
    }
    if longer(&target.editors, &incoming.editors) {
        target.editors = incoming.editors.clone();
        target.editors_truncated = incoming.editors_truncated;
    }
    // The TeX form only describes the title it was parsed with.
    if target.title_tex.is_none() && incoming.title == target.title {
        target.title_tex = incoming.title_tex.clone();
    }

    if target.year.is_none() {
        target.year = incoming.year;
    }
    backfill(&mut target.cite_key, &incoming.cite_key);
    backfill(&mut target.month, &incoming.month);
    backfill(&mut target.venue, &incoming.venue);
    backfill(&mut target.publisher, &incoming.publisher);
    backfill(&mut target.volume, &incoming.volume);
    backfill(&mut target.number, &incoming.number);
    backfill(&mut target.pages, &incoming.pages);
    backfill(&mut target.edition, &incoming.edition);
    backfill(&mut target.series, &incoming.series);
    backfill(&mut target.address, &incoming.address);
    backfill(&mut target.note, &incoming.note);
    backfill(&mut target.abstract_text, &incoming.abstract_text);
    backfill(&mut target.keywords, &incoming.keywords);
    backfill(&mut target.url, &incoming.url);

    for (name, value) in &incoming.extra {
        target
            .extra
            .entry(name.clone())
            .or_insert_with(|| value.clone());
    }

    let union = matches!(matched_by, MatchKind::Identifier { .. });
    let held: HashSet<IdScheme> = target.identifiers.iter().map(|id| id.scheme).collect();
    for id in &incoming.identifiers {
        let keep = if id.scheme.allows_multiple() {
            union || !held.contains(&id.scheme)
        } else {
            !held.contains(&id.scheme)
        };
        let duplicate = target
            .identifiers
            .iter()
            .any(|known| known.scheme == id.scheme && known.match_key() == id.match_key());
        if keep && !duplicate {
            target.identifiers.insert(id.clone());
        }
    }

    primary.relevance = primary.relevance.max(candidate.relevance);
    primary.lineage.push(LineageEntry {
        fingerprint,
        provenance: candidate.provenance.clone(),
        matched_by,
        absorbed_at: now,
    });
    primary.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsbib_core::{Database, EntryType, Provenance, Repository};

    fn citation(title: &str, authors: &[(&str, &str)], year: Option<i32>) -> Citation {
        let mut c = Citation::new(title);
        c.authors = authors
            .iter()
            .map(|(s, g)| Author::new(*s, Some(g.to_string())))
            .collect();
        c.year = year;
        c
    }

    fn candidate(c: Citation) -> CandidateRecord {
        CandidateRecord::new(c, Provenance::new("test", "memory"))
    }

    fn store(db: &Database, c: Citation) -> RecordId {
        let cand = candidate(c);
        let fp = fingerprint(&cand.citation);
        let record = BibliographicRecord::from_candidate(cand, fp);
        let id = record.id;
        db.write(|repo| repo.save(&record)).unwrap();
        id
    }

    fn resolve(db: &Database, c: Citation) -> Result<Resolution> {
        let engine = DedupEngine::default();
        let cand = candidate(c);
        let fp = fingerprint(&cand.citation);
        db.read(|repo| Ok(engine.resolve(repo, &cand, &fp)))
            .unwrap()
    }

    #[test]
    fn fingerprint_ignores_provenance() {
        let c = citation("Time Series Analysis", &[("Hamilton", "James D.")], Some(1994));
        let a = CandidateRecord::new(c.clone(), Provenance::new("crossref", "a"));
        let b = CandidateRecord::new(c, Provenance::new("bibtex", "b"));
        assert_eq!(fingerprint(&a.citation), fingerprint(&b.citation));
        assert_eq!(fingerprint(&a.citation).len(), 64);
    }

    #[test]
    fn exact_input_is_unchanged() {
        let db = Database::open_in_memory().unwrap();
        let c = citation("Time Series Analysis", &[("Hamilton", "James D.")], Some(1994));
        let id = store(&db, c.clone());
        assert_eq!(resolve(&db, c).unwrap(), Resolution::Unchanged(id));
    }

    #[test]
    fn shared_isbn_merges_regardless_of_title_case() {
        let db = Database::open_in_memory().unwrap();
        let mut stored = citation("The Art of Computer Programming", &[("Knuth", "Donald E.")], Some(1997));
        stored
            .identifiers
            .insert(ExternalId::new(IdScheme::Isbn, "0201896834"));
        let id = store(&db, stored);

        let mut incoming = citation("THE ART OF COMPUTER PROGRAMMING", &[], None);
        incoming
            .identifiers
            .insert(ExternalId::new(IdScheme::Isbn, "9780201896831"));
        assert_eq!(
            resolve(&db, incoming).unwrap(),
            Resolution::MergeInto {
                id,
                matched_by: MatchKind::Identifier {
                    scheme: IdScheme::Isbn
                }
            }
        );
    }

    #[test]
    fn identifiers_split_across_records_conflict() {
        let db = Database::open_in_memory().unwrap();
        let mut a = citation("Forecasting", &[("Hyndman", "Rob")], Some(2018));
        a.identifiers.insert(ExternalId::new(IdScheme::Isbn, "9780987507112"));
        let mut b = citation("Econometrics", &[("Hamilton", "James")], Some(1994));
        b.identifiers.insert(ExternalId::new(IdScheme::Doi, "10.1000/b"));
        store(&db, a);
        store(&db, b);

        let mut incoming = citation("Mixed", &[], None);
        incoming
            .identifiers
            .insert(ExternalId::new(IdScheme::Isbn, "9780987507112"));
        incoming
            .identifiers
            .insert(ExternalId::new(IdScheme::Doi, "10.1000/b"));
        match resolve(&db, incoming) {
            Err(crate::error::HarvestError::MergeConflict(conflict)) => {
                assert_eq!(conflict.owners.len(), 2);
                assert_eq!(conflict.identifiers.len(), 2);
            }
            other => panic!("expected merge conflict, got {other:?}"),
        }
    }

    #[test]
    fn near_duplicate_merges_by_similarity() {
        let db = Database::open_in_memory().unwrap();
        let id = store(
            &db,
            citation(
                "Time Series Analysis: Forecasting and Control",
                &[("Box", "George E. P."), ("Jenkins", "Gwilym M.")],
                Some(1976),
            ),
        );
        let incoming = citation(
            "Time series analysis, forecasting and control",
            &[("Box", "G."), ("Jenkins", "G.")],
            Some(1977),
        );
        match resolve(&db, incoming).unwrap() {
            Resolution::MergeInto {
                id: target,
                matched_by: MatchKind::Similarity { score },
            } => {
                assert_eq!(target, id);
                assert!(score >= 0.85);
            }
            other => panic!("expected similarity merge, got {other:?}"),
        }
    }

    #[test]
    fn similar_title_with_disjoint_authors_and_years_stays_apart() {
        let db = Database::open_in_memory().unwrap();
        store(
            &db,
            citation("Time Series Analysis", &[("Hamilton", "James D.")], Some(1994)),
        );
        let incoming = citation("Time Series Analysis", &[("Chatfield", "Chris")], Some(2003));
        assert_eq!(resolve(&db, incoming).unwrap(), Resolution::New);
    }

    #[test]
    fn different_doi_never_matches() {
        let engine = DedupEngine::default();
        let mut a = citation("Deep State Space Models", &[("Rangapuram", "Syama")], Some(2018));
        let mut b = a.clone();
        a.identifiers.insert(ExternalId::new(IdScheme::Doi, "10.1000/a"));
        b.identifiers.insert(ExternalId::new(IdScheme::Doi, "10.1000/b"));
        assert_eq!(engine.score(&a, &b), 0.0);
    }

    #[test]
    fn ties_go_to_the_earliest_record() {
        let db = Database::open_in_memory().unwrap();
        let first = store(&db, citation("Spectral Analysis", &[("Priestley", "M. B.")], Some(1981)));
        let mut twin = citation("Spectral Analysis", &[("Priestley", "M. B.")], Some(1981));
        twin.note = Some("second copy".to_string());
        store(&db, twin);

        let mut incoming = citation("Spectral analysis", &[("Priestley", "Maurice")], Some(1981));
        incoming.publisher = Some("Academic Press".to_string());
        match resolve(&db, incoming).unwrap() {
            Resolution::MergeInto { id, .. } => assert_eq!(id, first),
            other => panic!("expected merge, got {other:?}"),
        }
    }

    #[test]
    fn merge_carries_tex_title_truncation_and_relevance() {
        let stored = citation("DeepAR", &[("Salinas", "David")], Some(2017));
        let cand = candidate(stored).with_relevance(0.2);
        let fp = fingerprint(&cand.citation);
        let mut primary = BibliographicRecord::from_candidate(cand, fp);

        let mut incoming = citation(
            "DeepAR",
            &[("Salinas", "David"), ("Flunkert", "Valentin")],
            Some(2017),
        );
        incoming.title_tex = Some("{DeepAR}".to_string());
        incoming.authors_truncated = true;
        merge_into(
            &mut primary,
            &candidate(incoming).with_relevance(0.7),
            MatchKind::Similarity { score: 0.95 },
            "fp-2".to_string(),
        );

        assert_eq!(primary.citation.title_tex.as_deref(), Some("{DeepAR}"));
        assert_eq!(primary.citation.authors.len(), 2);
        assert!(primary.citation.authors_truncated);
        assert_eq!(primary.relevance, 0.7);
    }

    #[test]
    fn merge_is_monotonic() {
        let mut stored = citation("Time Series Analysis", &[("Hamilton", "J.")], Some(1994));
        stored.publisher = Some("Princeton University Press".to_string());
        stored.entry_type = EntryType::Misc;
        stored.identifiers.insert(ExternalId::new(IdScheme::Doi, "10.1000/ham"));
        let cand = candidate(stored);
        let fp = fingerprint(&cand.citation);
        let mut primary = BibliographicRecord::from_candidate(cand, fp);
        let before = primary.citation.known_fields();

        let mut incoming = citation("Time series analysis", &[("Hamilton", "James Douglas")], None);
        incoming.entry_type = EntryType::Book;
        incoming.publisher = Some("PUP".to_string());
        incoming.pages = Some("799".to_string());
        incoming.identifiers.insert(ExternalId::new(IdScheme::Doi, "10.1000/other"));
        incoming.identifiers.insert(ExternalId::new(IdScheme::Isbn, "9780691042893"));
        incoming.extra.insert("language".to_string(), "English".to_string());

        merge_into(
            &mut primary,
            &candidate(incoming),
            MatchKind::Similarity { score: 0.9 },
            "fp-2".to_string(),
        );

        let merged = &primary.citation;
        for field in before {
            assert!(merged.known_fields().contains(&field), "{field} regressed");
        }
        assert_eq!(merged.title, "Time Series Analysis");
        assert_eq!(merged.entry_type, EntryType::Book);
        assert_eq!(merged.year, Some(1994));
        assert_eq!(merged.publisher.as_deref(), Some("Princeton University Press"));
        assert_eq!(merged.pages.as_deref(), Some("799"));
        assert_eq!(merged.authors[0].given.as_deref(), Some("James Douglas"));
        assert_eq!(
            merged.identifier(IdScheme::Doi).map(|id| id.value.as_str()),
            Some("10.1000/ham")
        );
        assert!(merged.identifier(IdScheme::Isbn).is_some());
        assert_eq!(merged.extra.get("language").map(String::as_str), Some("English"));
        assert_eq!(primary.lineage.len(), 2);
        assert_eq!(primary.lineage[1].fingerprint, "fp-2");
    }

    #[test]
    fn identifier_merge_unions_isbns() {
        let mut stored = citation("Forecasting", &[("Hyndman", "Rob J.")], Some(2018));
        stored.identifiers.insert(ExternalId::new(IdScheme::Isbn, "9780987507112"));
        let cand = candidate(stored);
        let fp = fingerprint(&cand.citation);
        let mut primary = BibliographicRecord::from_candidate(cand, fp);

        let mut incoming = citation("Forecasting: principles and practice", &[], None);
        incoming.identifiers.insert(ExternalId::new(IdScheme::Isbn, "9780987507112"));
        incoming.identifiers.insert(ExternalId::new(IdScheme::Isbn, "0987507109"));

        merge_into(
            &mut primary,
            &candidate(incoming),
            MatchKind::Identifier { scheme: IdScheme::Isbn },
            "fp-2".to_string(),
        );
        assert_eq!(primary.citation.identifiers_of(IdScheme::Isbn).count(), 2);
    }
}
