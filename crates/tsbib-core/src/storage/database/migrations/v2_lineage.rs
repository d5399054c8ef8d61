use rusqlite::Connection;

use super::Migration;
use crate::error::Result;
use crate::storage::database::schema;

pub struct V2Lineage;

impl Migration for V2Lineage {
    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &'static str {
        "Append-only lineage of absorbed inputs"
    }

    fn up(&self, conn: &Connection) -> Result<()> {
        schema::create_lineage_table(conn)
    }
}
