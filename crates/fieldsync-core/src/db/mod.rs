//! Database layer for fieldsync

mod connection;
mod migrations;
mod repository;
mod sync_state_repository;

pub use connection::Database;
pub use repository::{RecordRepository, SqliteRecordRepository};
pub use sync_state_repository::{
    ConflictRepository, DeviceStateRepository, SqliteConflictRepository,
    SqliteDeviceStateRepository,
};
