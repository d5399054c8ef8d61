use rusqlite::Connection;

use super::Migration;
use crate::error::Result;
use crate::storage::database::schema;

pub struct V3Search;

impl Migration for V3Search {
    fn version(&self) -> u32 {
        3
    }

    fn description(&self) -> &'static str {
        "Relevance and abstract columns for search"
    }

    fn up(&self, conn: &Connection) -> Result<()> {
        schema::add_search_columns(conn)
    }
}
