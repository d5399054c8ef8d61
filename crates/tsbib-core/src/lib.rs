pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{AppConfig, CoreConfig, DedupConfig, FetchConfig, SourceConfig, SourceFormat};
pub use error::{ExitCode, Result, TsbibError};
pub use models::*;

pub use storage::database::{ConnectionPool, Database, open_database, open_in_memory};
pub use storage::queries::{RecordFilter, RecordOrder};
pub use storage::repositories::{RecordRepository, Repository, SqliteRecordRepository};
