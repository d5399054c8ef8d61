pub mod database;
pub mod queries;
pub mod repositories;

pub use database::Database;
pub use queries::{RecordFilter, RecordOrder};
pub use repositories::{RecordRepository, Repository, SqliteRecordRepository};
