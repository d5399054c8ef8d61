mod v1_initial;
mod v2_lineage;
mod v3_search;

use chrono::Utc;
use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;
use crate::storage::database::schema;

pub trait Migration {
    fn version(&self) -> u32;
    fn description(&self) -> &'static str;
    fn up(&self, conn: &Connection) -> Result<()>;
}

fn record_migration(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn is_migration_applied(conn: &Connection, version: u32) -> Result<bool> {
    let applied: bool = conn
        .prepare("SELECT 1 FROM schema_migrations WHERE version = ?1")?
        .exists(rusqlite::params![version])?;
    Ok(applied)
}

fn all_migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(v1_initial::V1Initial),
        Box::new(v2_lineage::V2Lineage),
        Box::new(v3_search::V3Search),
    ]
}

/// Apply pending migrations in version order. Each one commits together
/// with its `schema_migrations` row, so a failure leaves the previous
/// version intact.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    schema::create_migrations_table(conn)?;

    for migration in all_migrations() {
        let version = migration.version();
        if is_migration_applied(conn, version)? {
            continue;
        }
        debug!(version, description = migration.description(), "applying migration");
        let tx = conn.unchecked_transaction()?;
        migration.up(&tx)?;
        record_migration(&tx, version)?;
        tx.commit()?;
    }

    Ok(())
}

pub fn get_applied_versions(conn: &Connection) -> Result<Vec<u32>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}
