//! Error types for the task ledger

use thiserror::Error;

/// Errors that can occur in the ledger persistence layer
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Filesystem error while reading or writing a ledger entry
    #[error("Ledger I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Entry could not be serialized or deserialized
    #[error("Ledger serialization failed: {0}")]
    Serialization(String),

    /// No entry exists for the given task id
    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}
