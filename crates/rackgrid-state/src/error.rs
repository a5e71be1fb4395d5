//! Error types for the device ledger.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for ledger operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading or writing the device table.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("invalid table contents: {0}")]
    Invalid(String),

    #[error("lock error on {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {waited:?} waiting for table lock {name}")]
    LockTimeout { name: String, waited: Duration },
}

impl StateError {
    /// Whether the error came from lock contention rather than the table itself.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, StateError::LockTimeout { .. })
    }
}
