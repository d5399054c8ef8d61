//! The catalog: the store plus the dedup engine, behind one write path.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};
use tsbib_core::{
    AppConfig, BibliographicRecord, CandidateRecord, Database, DedupConfig, IdScheme, MatchKind,
    Provenance, RecordFilter, RecordId, Repository, TsbibError,
};

use crate::dedup::{DedupEngine, Resolution, fingerprint, merge_into};
use crate::error::{ExportError, HarvestError, Result};
use crate::formats::{ExportFormat, parse_bibtex};
use crate::identifiers::normalize_identifier;
use crate::normalize::{Normalized, normalize_bib_entry};

/// What an upsert did with its candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted { id: RecordId },
    Merged { id: RecordId, matched_by: MatchKind },
    Unchanged { id: RecordId },
}

impl UpsertOutcome {
    pub fn id(&self) -> RecordId {
        match self {
            UpsertOutcome::Inserted { id }
            | UpsertOutcome::Merged { id, .. }
            | UpsertOutcome::Unchanged { id } => *id,
        }
    }
}

/// Tally of one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestCounts {
    pub inserted: usize,
    pub merged: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub warnings: usize,
}

impl IngestCounts {
    pub fn record(&mut self, outcome: &UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted { .. } => self.inserted += 1,
            UpsertOutcome::Merged { .. } => self.merged += 1,
            UpsertOutcome::Unchanged { .. } => self.unchanged += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Rejected {
    /// Cite key or position of the offending entry.
    pub entry: String,
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub entries: usize,
    pub counts: IngestCounts,
    pub rejected: Vec<Rejected>,
}

pub struct Catalog {
    db: Database,
    engine: DedupEngine,
}

impl Catalog {
    pub fn new(db: Database, dedup: DedupConfig) -> Self {
        Self {
            db,
            engine: DedupEngine::new(dedup),
        }
    }

    pub fn open(path: &Path, dedup: DedupConfig) -> Result<Self> {
        Ok(Self::new(Database::open(path)?, dedup))
    }

    pub fn open_in_memory(dedup: DedupConfig) -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?, dedup))
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::open(&config.database_path(), config.dedup.clone())
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Resolve `candidate` against the store and apply the result in one
    /// transaction. Either the insert or the merge lands in full, or nothing
    /// does.
    pub fn upsert(&self, candidate: CandidateRecord) -> Result<UpsertOutcome> {
        let fp = fingerprint(&candidate.citation);
        self.db.write(|repo| -> Result<UpsertOutcome> {
            match self.engine.resolve(repo, &candidate, &fp)? {
                Resolution::Unchanged(id) => {
                    debug!(record_id = %id, "input already absorbed");
                    Ok(UpsertOutcome::Unchanged { id })
                }
                Resolution::New => {
                    let record = BibliographicRecord::from_candidate(candidate, fp);
                    repo.save(&record)?;
                    debug!(record_id = %record.id, title = %record.citation.title, "inserted");
                    Ok(UpsertOutcome::Inserted { id: record.id })
                }
                Resolution::MergeInto { id, matched_by } => {
                    let mut primary = repo
                        .find_by_id(&id)?
                        .ok_or_else(|| TsbibError::RecordNotFound(id.to_string()))?;
                    merge_into(&mut primary, &candidate, matched_by.clone(), fp);
                    repo.save(&primary)?;
                    debug!(record_id = %id, ?matched_by, "merged");
                    Ok(UpsertOutcome::Merged { id, matched_by })
                }
            }
        })
    }

    /// Upsert a normalized candidate, tallying the outcome. Merge conflicts
    /// are counted and skipped; every other error is returned.
    pub fn ingest(&self, normalized: Normalized, counts: &mut IngestCounts) -> Result<Option<RecordId>> {
        counts.warnings += normalized.warnings.len();
        for warning in &normalized.warnings {
            warn!(title = %normalized.record.citation.title, %warning, "normalization");
        }
        match self.upsert(normalized.record) {
            Ok(outcome) => {
                counts.record(&outcome);
                Ok(Some(outcome.id()))
            }
            Err(HarvestError::MergeConflict(conflict)) => {
                warn!(%conflict, "candidate skipped");
                counts.conflicts += 1;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn get(&self, id: &RecordId) -> Result<BibliographicRecord> {
        Ok(self.db.get_record(id)?)
    }

    /// Look a record up by a raw identifier, normalizing it first.
    pub fn find_by_identifier(&self, scheme: IdScheme, raw: &str) -> Result<BibliographicRecord> {
        let id = normalize_identifier(scheme, raw)
            .map_err(|e| TsbibError::ValidationError(e.to_string()))?;
        self.db
            .find_by_identifier(&id)?
            .ok_or_else(|| HarvestError::from(TsbibError::RecordNotFound(id.to_string())))
    }

    pub fn query(&self, filter: &RecordFilter) -> Result<Vec<BibliographicRecord>> {
        Ok(self.db.query(filter)?)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.db.count()?)
    }

    /// Render the given records, in the given order.
    pub fn export(&self, ids: &[RecordId], format: ExportFormat) -> std::result::Result<String, ExportError> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.db.get_record(id) {
                Ok(record) => records.push(record),
                Err(TsbibError::RecordNotFound(_)) => return Err(ExportError::NotFound(id.to_string())),
                Err(e) => return Err(e.into()),
            }
        }
        let refs: Vec<&BibliographicRecord> = records.iter().collect();
        format.render(&refs)
    }

    /// Render every record matching `filter`, in creation order.
    pub fn export_matching(
        &self,
        filter: &RecordFilter,
        format: ExportFormat,
    ) -> std::result::Result<String, ExportError> {
        let records = self.db.query(filter)?;
        let refs: Vec<&BibliographicRecord> = records.iter().collect();
        format.render(&refs)
    }

    /// Import a BibTeX document. Entries without a title and entries whose
    /// identifiers span several records are reported and skipped; a syntax
    /// error rejects the whole document before anything is stored.
    pub fn import_bibtex(&self, input: &str, origin: &str) -> Result<ImportReport> {
        let entries = parse_bibtex(input)?;
        let mut report = ImportReport {
            entries: entries.len(),
            ..Default::default()
        };

        for (index, entry) in entries.iter().enumerate() {
            let label = if entry.key.is_empty() {
                format!("#{}", index + 1)
            } else {
                entry.key.clone()
            };
            let normalized = match normalize_bib_entry(entry, Provenance::new("bibtex", origin)) {
                Ok(n) => n,
                Err(e) => {
                    warn!(entry = %label, line = entry.line, error = %e, "entry rejected");
                    report.counts.skipped += 1;
                    report.rejected.push(Rejected {
                        entry: label,
                        line: entry.line,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let conflicts = report.counts.conflicts;
            self.ingest(normalized, &mut report.counts)?;
            if report.counts.conflicts > conflicts {
                report.rejected.push(Rejected {
                    entry: label,
                    line: entry.line,
                    reason: "identifiers belong to different records".to_string(),
                });
            }
        }

        info!(
            origin,
            entries = report.entries,
            inserted = report.counts.inserted,
            merged = report.counts.merged,
            unchanged = report.counts.unchanged,
            skipped = report.counts.skipped,
            "bibtex import finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsbib_core::{Citation, ExternalId};

    fn catalog() -> Catalog {
        Catalog::open_in_memory(DedupConfig::default()).unwrap()
    }

    fn candidate(title: &str, isbn: Option<&str>) -> CandidateRecord {
        let mut citation = Citation::new(title);
        if let Some(isbn) = isbn {
            citation.identifiers.insert(ExternalId::new(IdScheme::Isbn, isbn));
        }
        CandidateRecord::new(citation, Provenance::new("test", "memory"))
    }

    #[test]
    fn upsert_inserts_then_reports_unchanged() {
        let catalog = catalog();
        let first = catalog.upsert(candidate("Forecasting", Some("9780987507112"))).unwrap();
        assert!(matches!(first, UpsertOutcome::Inserted { .. }));
        let again = catalog.upsert(candidate("Forecasting", Some("9780987507112"))).unwrap();
        assert_eq!(again, UpsertOutcome::Unchanged { id: first.id() });
        assert_eq!(catalog.count().unwrap(), 1);
    }

    #[test]
    fn find_by_identifier_normalizes_input() {
        let catalog = catalog();
        let id = catalog
            .upsert(candidate("The Art of Computer Programming", Some("0201896834")))
            .unwrap()
            .id();
        let found = catalog
            .find_by_identifier(IdScheme::Isbn, "978-0-201-89683-1")
            .unwrap();
        assert_eq!(found.id, id);
    }

    #[test]
    fn find_by_invalid_identifier_is_a_validation_error() {
        let err = catalog()
            .find_by_identifier(IdScheme::Isbn, "not an isbn")
            .unwrap_err();
        assert!(matches!(err, HarvestError::Store(TsbibError::ValidationError(_))));
    }

    #[test]
    fn export_unknown_id_is_not_found() {
        let err = catalog()
            .export(&[RecordId::generate()], ExportFormat::Bibtex)
            .unwrap_err();
        assert!(matches!(err, ExportError::NotFound(_)));
    }

    #[test]
    fn import_counts_rejections() {
        let catalog = catalog();
        let bib = r#"
@book{knuth1997,
  author = {Knuth, Donald E.},
  title = {The Art of Computer Programming},
  year = {1997},
  isbn = {0-201-89683-4}
}

@misc{untitled,
  author = {Nobody}
}
"#;
        let report = catalog.import_bibtex(bib, "test.bib").unwrap();
        assert_eq!(report.entries, 2);
        assert_eq!(report.counts.inserted, 1);
        assert_eq!(report.counts.skipped, 1);
        assert_eq!(report.rejected[0].entry, "untitled");
    }

    #[test]
    fn syntax_error_stores_nothing() {
        let catalog = catalog();
        let err = catalog
            .import_bibtex("@book{a, title = {Open\n", "broken.bib")
            .unwrap_err();
        assert!(matches!(err, HarvestError::BibtexParse { .. }));
        assert_eq!(catalog.count().unwrap(), 0);
    }
}
