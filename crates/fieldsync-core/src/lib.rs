//! fieldsync-core - Core library for fieldsync
//!
//! Offline-first storage, synchronization, and device recovery for field
//! work data: records are committed locally first, synced when the remote
//! is reachable, and protected by multi-tier backups against device loss.

pub mod checksum;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod models;
pub mod recovery;
pub mod store;
pub mod sync;

pub use config::{EngineConfig, RecoveryConfig};
pub use error::{Error, Result};
pub use models::{
    OfflineRecord, Operation, RecordId, RecordType, ResolutionStrategy, SyncConflict, SyncStatus,
};
pub use store::StoreService;
pub use sync::{SyncEngine, SyncReport};
