use rusqlite::Connection;

use super::Migration;
use crate::error::Result;
use crate::storage::database::schema;

pub struct V1Initial;

impl Migration for V1Initial {
    fn version(&self) -> u32 {
        1
    }

    fn description(&self) -> &'static str {
        "Records and external identifier tables"
    }

    fn up(&self, conn: &Connection) -> Result<()> {
        schema::create_record_tables(conn)?;
        schema::create_record_indexes(conn)?;
        Ok(())
    }
}
