// Error taxonomy for indexing and queries

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    /// A single file could not be parsed. Recovered per file.
    #[error("failed to parse {file}: {reason}")]
    Parse { file: String, reason: String },

    /// The indexing worker ran out of memory or CPU time.
    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// The watchdog judged the indexing run hung.
    #[error("indexing run {run_id} stalled: no progress for {stalled_secs}s")]
    HungProcess { run_id: i64, stalled_secs: i64 },

    #[error("schema mismatch: store has v{found}, expected v{expected}")]
    SchemaMismatch { found: i64, expected: i64 },

    /// The run was superseded (failed, canceled or replaced) before it could commit.
    #[error("run {run_id} is no longer the active indexing run")]
    StaleWriteRace { run_id: i64 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexError {
    pub fn parse(file: impl Into<String>, reason: impl Into<String>) -> Self {
        IndexError::Parse {
            file: file.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound(_))
    }
}
