//! Error types for fieldsync-core

use thiserror::Error;

/// Result type alias using fieldsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fieldsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Checksum did not match the record payload
    #[error("Checksum mismatch for {0}")]
    Integrity(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Parent record has not been synced yet; retry next cycle
    #[error("Record {record} depends on unsynced parent {parent}")]
    DependencyNotSynced { record: String, parent: String },

    /// Remote sync request failed (rejection, timeout, malformed response)
    #[error("Remote sync failed: {0}")]
    Remote(String),
}
