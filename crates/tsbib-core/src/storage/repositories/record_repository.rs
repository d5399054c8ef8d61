use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params, params_from_iter};
use serde::de::DeserializeOwned;

use crate::error::{Result, TsbibError};
use crate::models::{BibliographicRecord, ExternalId, IdScheme, LineageEntry, RecordId};
use crate::storage::queries::RecordFilter;

use super::Repository;

pub trait RecordRepository: Repository<Entity = BibliographicRecord, Id = RecordId> {
    /// Record currently holding `(scheme, match_key)`.
    fn owner_of(&self, scheme: IdScheme, match_key: &str) -> Result<Option<RecordId>>;
    /// Record whose lineage already contains this input fingerprint.
    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<RecordId>>;
    /// Records within `window` years of `year`, plus records of unknown year.
    fn near_year(&self, year: i32, window: i32) -> Result<Vec<BibliographicRecord>>;
    fn all(&self) -> Result<Vec<BibliographicRecord>>;
    fn query(&self, filter: &RecordFilter) -> Result<Vec<BibliographicRecord>>;
    fn count(&self) -> Result<usize>;
}

const RECORD_COLUMNS: &str = "seq, id, citation, provenance, created_at, updated_at, relevance";

/// Repository over a borrowed connection. Inside `Database::write` the
/// connection is an open transaction.
pub struct SqliteRecordRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteRecordRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<BibliographicRecord> {
        let id_str: String = row.get(1)?;
        let id = id_str.parse::<RecordId>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
        })?;
        Ok(BibliographicRecord {
            id,
            seq: row.get(0)?,
            citation: json_column(row, 2)?,
            provenance: json_column(row, 3)?,
            relevance: row.get(6)?,
            lineage: Vec::new(),
            created_at: time_column(row, 4)?,
            updated_at: time_column(row, 5)?,
        })
    }

    fn load_lineage(&self, id: &RecordId) -> Result<Vec<LineageEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT fingerprint, provenance, matched_by, absorbed_at
             FROM record_lineage WHERE record_id = ?1 ORDER BY position",
        )?;
        let entries = stmt
            .query_map(params![id.to_string()], |row| {
                Ok(LineageEntry {
                    fingerprint: row.get(0)?,
                    provenance: json_column(row, 1)?,
                    matched_by: json_column(row, 2)?,
                    absorbed_at: time_column(row, 3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn select(&self, tail: &str, values: Vec<rusqlite::types::Value>) -> Result<Vec<BibliographicRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records{tail}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for mut record in rows {
            record.lineage = self.load_lineage(&record.id)?;
            records.push(record);
        }
        Ok(records)
    }

    /// Bind an identifier to `owner`. Rebinding a key held by another record
    /// is an invariant violation.
    fn claim_identifier(&self, owner: &RecordId, id: &ExternalId) -> Result<()> {
        let key = id.match_key();
        match self.owner_of(id.scheme, &key)? {
            Some(current) if current == *owner => Ok(()),
            Some(current) => Err(TsbibError::InvariantViolation(format!(
                "{id} is already held by record {current}, refusing to bind it to {owner}"
            ))),
            None => {
                self.conn
                    .execute(
                        "INSERT INTO record_identifiers (scheme, match_key, value, record_id)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![id.scheme.as_str(), key, id.value, owner.to_string()],
                    )
                    .map_err(constraint_violation)?;
                Ok(())
            }
        }
    }

    /// Lineage is append-only: stored entries must be a prefix of the new
    /// list, and only the tail is written.
    fn append_lineage(&self, owner: &RecordId, lineage: &[LineageEntry]) -> Result<()> {
        let stored: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT fingerprint FROM record_lineage WHERE record_id = ?1 ORDER BY position",
            )?;
            stmt.query_map(params![owner.to_string()], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        let is_prefix = stored.len() <= lineage.len()
            && stored
                .iter()
                .zip(lineage)
                .all(|(fp, entry)| *fp == entry.fingerprint);
        if !is_prefix {
            return Err(TsbibError::InvariantViolation(format!(
                "lineage of record {owner} would be rewritten"
            )));
        }

        for (position, entry) in lineage.iter().enumerate().skip(stored.len()) {
            self.conn
                .execute(
                    "INSERT INTO record_lineage
                        (record_id, position, fingerprint, provenance, matched_by, absorbed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        owner.to_string(),
                        position as i64,
                        entry.fingerprint,
                        serde_json::to_string(&entry.provenance)?,
                        serde_json::to_string(&entry.matched_by)?,
                        entry.absorbed_at.to_rfc3339(),
                    ],
                )
                .map_err(constraint_violation)?;
        }
        Ok(())
    }
}

impl<'c> Repository for SqliteRecordRepository<'c> {
    type Entity = BibliographicRecord;
    type Id = RecordId;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
                params![id.to_string()],
                Self::row_to_record,
            )
            .optional()?;

        match row {
            Some(mut record) => {
                record.lineage = self.load_lineage(&record.id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Insert or update the record row, then bind its identifiers and append
    /// any new lineage entries. `seq` is assigned on first insert and kept.
    fn save(&self, record: &Self::Entity) -> Result<()> {
        let citation = &record.citation;
        let authors_text = citation
            .authors
            .iter()
            .map(|a| a.display_natural().to_lowercase())
            .collect::<Vec<_>>()
            .join("; ");

        self.conn
            .execute(
                "INSERT INTO records
                    (id, entry_type, title, year, venue, authors_text, citation, provenance,
                     created_at, updated_at, relevance, abstract_text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    entry_type    = excluded.entry_type,
                    title         = excluded.title,
                    year          = excluded.year,
                    venue         = excluded.venue,
                    authors_text  = excluded.authors_text,
                    citation      = excluded.citation,
                    updated_at    = excluded.updated_at,
                    relevance     = excluded.relevance,
                    abstract_text = excluded.abstract_text",
                params![
                    record.id.to_string(),
                    citation.entry_type.as_str(),
                    citation.title,
                    citation.year,
                    citation.venue,
                    authors_text,
                    serde_json::to_string(citation)?,
                    serde_json::to_string(&record.provenance)?,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                    record.relevance,
                    citation.abstract_text,
                ],
            )
            .map_err(constraint_violation)?;

        for id in &citation.identifiers {
            self.claim_identifier(&record.id, id)?;
        }
        self.append_lineage(&record.id, &record.lineage)
    }
}

impl<'c> RecordRepository for SqliteRecordRepository<'c> {
    fn owner_of(&self, scheme: IdScheme, match_key: &str) -> Result<Option<RecordId>> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT record_id FROM record_identifiers WHERE scheme = ?1 AND match_key = ?2",
                params![scheme.as_str(), match_key],
                |row| row.get(0),
            )
            .optional()?;
        owner.map(|s| s.parse::<RecordId>()).transpose()
    }

    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<RecordId>> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT record_id FROM record_lineage WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        owner.map(|s| s.parse::<RecordId>()).transpose()
    }

    fn near_year(&self, year: i32, window: i32) -> Result<Vec<BibliographicRecord>> {
        self.select(
            " WHERE year IS NULL OR year BETWEEN ?1 AND ?2 ORDER BY seq",
            vec![
                rusqlite::types::Value::Integer(i64::from(year - window)),
                rusqlite::types::Value::Integer(i64::from(year + window)),
            ],
        )
    }

    fn all(&self) -> Result<Vec<BibliographicRecord>> {
        self.select(" ORDER BY seq", Vec::new())
    }

    fn query(&self, filter: &RecordFilter) -> Result<Vec<BibliographicRecord>> {
        let (tail, values) = filter.to_sql();
        self.select(&tail, values)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// SQLite constraint failures mean a uniqueness rule the dedup layer should
/// have upheld did not hold.
fn constraint_violation(err: rusqlite::Error) -> TsbibError {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
            TsbibError::InvariantViolation(msg.clone().unwrap_or_else(|| e.to_string()))
        }
        _ => TsbibError::Database(err),
    }
}
