use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: u32 = 3;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

pub fn create_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// `seq` is the creation order used for tie-breaks; `id` is the public
/// identifier. The citation itself is kept as JSON, with the columns that
/// queries filter on copied out next to it.
pub fn create_record_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS records (
            seq          INTEGER PRIMARY KEY AUTOINCREMENT,
            id           TEXT NOT NULL UNIQUE,
            entry_type   TEXT NOT NULL DEFAULT 'misc',
            title        TEXT NOT NULL,
            year         INTEGER,
            venue        TEXT,
            authors_text TEXT NOT NULL DEFAULT '',
            citation     TEXT NOT NULL,
            provenance   TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS record_identifiers (
            scheme     TEXT NOT NULL,
            match_key  TEXT NOT NULL,
            value      TEXT NOT NULL,
            record_id  TEXT NOT NULL REFERENCES records(id),
            PRIMARY KEY (scheme, match_key)
        );
        ",
    )?;
    Ok(())
}

pub fn create_record_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_records_year       ON records(year);
        CREATE INDEX IF NOT EXISTS idx_identifiers_record ON record_identifiers(record_id);
        ",
    )?;
    Ok(())
}

pub fn create_lineage_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS record_lineage (
            record_id   TEXT NOT NULL REFERENCES records(id),
            position    INTEGER NOT NULL,
            fingerprint TEXT NOT NULL UNIQUE,
            provenance  TEXT NOT NULL,
            matched_by  TEXT NOT NULL,
            absorbed_at TEXT NOT NULL,
            PRIMARY KEY (record_id, position)
        );
        ",
    )?;
    Ok(())
}

/// Rows written before this version keep relevance 0; their abstract is
/// copied out of the citation JSON.
pub fn add_search_columns(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        ALTER TABLE records ADD COLUMN relevance REAL NOT NULL DEFAULT 0;
        ALTER TABLE records ADD COLUMN abstract_text TEXT;
        UPDATE records SET abstract_text = json_extract(citation, '$.abstract_text');
        CREATE INDEX IF NOT EXISTS idx_records_relevance ON records(relevance);
        CREATE INDEX IF NOT EXISTS idx_records_entry_type ON records(entry_type);
        ",
    )?;
    Ok(())
}
