//! Data models for fieldsync

mod backup;
mod conflict;
mod device;
mod record;

pub use backup::{
    AutoSavePoint, CloudBackup, DeviceSnapshot, EmergencySave, RecoveryCheckpoint, RecoveryReport,
    RecoveryStatus, SnapshotRecord,
};
pub use conflict::{ConflictId, ConflictType, ResolutionStrategy, SyncConflict};
pub use device::{DeviceSyncState, NetworkStatus, OfflineStatus};
pub use record::{OfflineRecord, Operation, RecordId, RecordType, SyncStatus};
