use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Record payload must be valid JSON: {0}")]
    InvalidPayload(String),
    #[error("Invalid record ID: {0}")]
    InvalidRecordId(String),
    #[error("Invalid conflict ID: {0}")]
    InvalidConflictId(String),
    #[error("Could not determine a data directory; pass --db-path")]
    NoDataDir,
}
