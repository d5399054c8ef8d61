use thiserror::Error;

/// All errors that can occur in tsbib-core.
#[derive(Debug, Error)]
pub enum TsbibError {
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// A storage-level integrity rule was broken. Ingestion must stop when
    /// this surfaces; it means the dedup layer let something through.
    #[error("Store invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl TsbibError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

/// Exit codes used by the `tsbib` binary.
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    NetworkError = 6,
    Conflict = 7,
}

pub type Result<T> = std::result::Result<T, TsbibError>;
