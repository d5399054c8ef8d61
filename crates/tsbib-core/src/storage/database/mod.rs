mod connection;
mod migrations;
mod schema;

pub use connection::ConnectionPool;
pub use migrations::{Migration, get_applied_versions, run_migrations};
pub use schema::SCHEMA_VERSION;

use std::path::Path;

use crate::error::{Result, TsbibError};
use crate::models::{BibliographicRecord, ExternalId, RecordId};
use crate::storage::queries::RecordFilter;
use crate::storage::repositories::{RecordRepository, Repository, SqliteRecordRepository};

pub fn open_database(path: &Path) -> Result<ConnectionPool> {
    let pool = ConnectionPool::open(path)?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

pub fn open_in_memory() -> Result<ConnectionPool> {
    let pool = ConnectionPool::open_in_memory()?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

/// The record store. Owns the single connection; every mutation goes
/// through [`Database::write`].
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let pool = open_database(path)?;
        Ok(Self { pool })
    }

    pub fn open_in_memory() -> Result<Self> {
        let pool = open_in_memory()?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Run `f` against a repository bound to one transaction. The transaction
    /// commits only when `f` returns `Ok`; any error rolls every statement
    /// back, so readers never see a half-applied merge.
    pub fn write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&SqliteRecordRepository<'_>) -> std::result::Result<T, E>,
        E: From<TsbibError>,
    {
        let mut conn = self.pool.get_connection();
        let tx = conn.transaction().map_err(TsbibError::from)?;
        let value = {
            let repo = SqliteRecordRepository::new(&tx);
            f(&repo)?
        };
        tx.commit().map_err(TsbibError::from)?;
        Ok(value)
    }

    /// Run `f` against a repository on the plain connection.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SqliteRecordRepository<'_>) -> Result<T>,
    {
        let conn = self.pool.get_connection();
        let repo = SqliteRecordRepository::new(&conn);
        f(&repo)
    }

    pub fn get_record(&self, id: &RecordId) -> Result<BibliographicRecord> {
        self.read(|repo| repo.find_by_id(id))?
            .ok_or_else(|| TsbibError::RecordNotFound(id.to_string()))
    }

    /// Look a record up by an already normalized identifier.
    pub fn find_by_identifier(&self, id: &ExternalId) -> Result<Option<BibliographicRecord>> {
        self.read(|repo| match repo.owner_of(id.scheme, &id.match_key())? {
            Some(owner) => repo.find_by_id(&owner),
            None => Ok(None),
        })
    }

    pub fn query(&self, filter: &RecordFilter) -> Result<Vec<BibliographicRecord>> {
        self.read(|repo| repo.query(filter))
    }

    pub fn count(&self) -> Result<usize> {
        self.read(|repo| repo.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Author, CandidateRecord, Citation, EntryType, IdScheme, LineageEntry, MatchKind,
        Provenance,
    };
    use crate::storage::queries::RecordOrder;
    use chrono::Utc;
    use tempfile::TempDir;

    fn knuth() -> BibliographicRecord {
        let mut citation = Citation::new("The Art of Computer Programming");
        citation.authors = vec![Author::new("Knuth", Some("Donald E.".to_string()))];
        citation.year = Some(1997);
        citation.publisher = Some("Addison-Wesley".to_string());
        citation
            .identifiers
            .insert(ExternalId::new(IdScheme::Isbn, "0201896834"));
        let candidate = CandidateRecord::new(citation, Provenance::new("bibtex", "knuth.bib"));
        BibliographicRecord::from_candidate(candidate, "fp-knuth".to_string())
    }

    fn save(db: &Database, record: &BibliographicRecord) -> Result<()> {
        db.write(|repo| repo.save(record))
    }

    #[test]
    fn test_migrations_are_recorded() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.pool().get_connection();
        let versions = get_applied_versions(&conn).unwrap();
        assert_eq!(versions.last().copied(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_save_and_get_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let record = knuth();
        save(&db, &record).unwrap();

        let loaded = db.get_record(&record.id).unwrap();
        assert_eq!(loaded.citation, record.citation);
        assert_eq!(loaded.lineage.len(), 1);
        assert_eq!(loaded.lineage[0].matched_by, MatchKind::Origin);
        assert_eq!(loaded.seq, 1);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_record(&RecordId::generate()).unwrap_err();
        assert!(matches!(err, TsbibError::RecordNotFound(_)));
    }

    #[test]
    fn test_find_by_identifier_uses_isbn13_key() {
        let db = Database::open_in_memory().unwrap();
        let record = knuth();
        save(&db, &record).unwrap();

        let by13 = ExternalId::new(IdScheme::Isbn, "9780201896831");
        let found = db.find_by_identifier(&by13).unwrap().unwrap();
        assert_eq!(found.id, record.id);
    }

    #[test]
    fn test_identifier_cannot_move_to_another_record() {
        let db = Database::open_in_memory().unwrap();
        save(&db, &knuth()).unwrap();

        let mut other = knuth();
        other.id = RecordId::generate();
        other.lineage[0].fingerprint = "fp-other".to_string();
        let err = save(&db, &other).unwrap_err();
        assert!(err.is_invariant_violation());
        // The failed write rolled back its record row too.
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_fingerprint_is_invariant_violation() {
        let db = Database::open_in_memory().unwrap();
        save(&db, &knuth()).unwrap();

        let mut copy = knuth();
        copy.citation.identifiers.clear();
        let err = save(&db, &copy).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_lineage_is_append_only() {
        let db = Database::open_in_memory().unwrap();
        let mut record = knuth();
        save(&db, &record).unwrap();

        record.lineage.push(LineageEntry {
            fingerprint: "fp-second".to_string(),
            provenance: Provenance::new("crossref", "https://api.crossref.org/works"),
            matched_by: MatchKind::Identifier {
                scheme: IdScheme::Isbn,
            },
            absorbed_at: Utc::now(),
        });
        save(&db, &record).unwrap();
        assert_eq!(db.get_record(&record.id).unwrap().lineage.len(), 2);

        record.lineage.remove(0);
        let err = save(&db, &record).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_fingerprint_lookup() {
        let db = Database::open_in_memory().unwrap();
        let record = knuth();
        save(&db, &record).unwrap();
        let owner = db.read(|repo| repo.find_by_fingerprint("fp-knuth")).unwrap();
        assert_eq!(owner, Some(record.id));
        let none = db.read(|repo| repo.find_by_fingerprint("nope")).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_query_filters_and_orders_by_seq() {
        let db = Database::open_in_memory().unwrap();
        let mut ids = Vec::new();
        for (i, (title, surname, year, venue)) in [
            ("Time Series Analysis", "Box", 1970, "Holden-Day"),
            ("Forecasting: Principles and Practice", "Hyndman", 2018, "OTexts"),
            ("Analysis of Financial Time Series", "Tsay", 2005, "Wiley"),
        ]
        .into_iter()
        .enumerate()
        {
            let mut citation = Citation::new(title);
            citation.authors = vec![Author::new(surname, None)];
            citation.year = Some(year);
            citation.venue = Some(venue.to_string());
            let candidate = CandidateRecord::new(citation, Provenance::new("test", "mem"));
            let record = BibliographicRecord::from_candidate(candidate, format!("fp-{i}"));
            ids.push(record.id);
            save(&db, &record).unwrap();
        }

        let all = db.query(&RecordFilter::new()).unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), ids);

        let recent = db
            .query(&RecordFilter::new().years(Some(2000), None))
            .unwrap();
        assert_eq!(recent.len(), 2);

        let by_author = db.query(&RecordFilter::new().author("HYND")).unwrap();
        assert_eq!(by_author.len(), 1);
        assert_eq!(by_author[0].id, ids[1]);

        let by_venue = db.query(&RecordFilter::new().venue("wiley")).unwrap();
        assert_eq!(by_venue[0].id, ids[2]);

        let limited = db.query(&RecordFilter::new().limit(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, ids[0]);
    }

    #[test]
    fn test_search_by_text_source_type_and_relevance() {
        let db = Database::open_in_memory().unwrap();
        let mut ids = Vec::new();
        for (i, (title, abstract_text, source, entry_type, relevance)) in [
            ("Spectral Analysis", Some("ARIMA residual spectra"), "crossref", EntryType::Article, 0.4),
            ("Seasonal ARIMA Models", None, "arxiv", EntryType::Article, 0.9),
            ("Graph Colouring", None, "arxiv", EntryType::Book, 0.0),
        ]
        .into_iter()
        .enumerate()
        {
            let mut citation = Citation::new(title);
            citation.abstract_text = abstract_text.map(str::to_string);
            citation.entry_type = entry_type;
            let candidate = CandidateRecord::new(citation, Provenance::new(source, "mem"))
                .with_relevance(relevance);
            let record = BibliographicRecord::from_candidate(candidate, format!("fp-{i}"));
            ids.push(record.id);
            save(&db, &record).unwrap();
        }

        let arima = db.query(&RecordFilter::new().text("arima")).unwrap();
        assert_eq!(arima.iter().map(|r| r.id).collect::<Vec<_>>(), ids[..2].to_vec());

        let ranked = db
            .query(&RecordFilter::new().text("ARIMA").order(RecordOrder::Relevance))
            .unwrap();
        assert_eq!(ranked[0].id, ids[1]);
        assert_eq!(ranked[0].relevance, 0.9);

        let from_arxiv = db.query(&RecordFilter::new().source("ArXiv")).unwrap();
        assert_eq!(from_arxiv.iter().map(|r| r.id).collect::<Vec<_>>(), ids[1..].to_vec());

        let books = db
            .query(&RecordFilter::new().entry_type(EntryType::Book))
            .unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, ids[2]);
    }

    #[test]
    fn test_near_year_includes_unknown_years() {
        let db = Database::open_in_memory().unwrap();
        let mut dated = knuth();
        dated.citation.identifiers.clear();
        save(&db, &dated).unwrap();

        let mut undated = knuth();
        undated.id = RecordId::generate();
        undated.citation.identifiers.clear();
        undated.citation.year = None;
        undated.lineage[0].fingerprint = "fp-undated".to_string();
        save(&db, &undated).unwrap();

        let near = db.read(|repo| repo.near_year(1998, 1)).unwrap();
        assert_eq!(near.len(), 2);
        let far = db.read(|repo| repo.near_year(2010, 1)).unwrap();
        assert_eq!(far.len(), 1);
        assert_eq!(far[0].id, undated.id);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lib").join("tsbib.db");
        let record = knuth();
        {
            let db = Database::open(&path).unwrap();
            save(&db, &record).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_record(&record.id).unwrap().citation.title, record.citation.title);
    }
}
