//! Thread-safe store handle shared by the engine, scheduler, and recovery.
//!
//! The database file is the single shared mutable resource; every component
//! goes through this service, which serializes writes behind one async mutex.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::db::{
    ConflictRepository, Database, DeviceStateRepository, RecordRepository,
    SqliteConflictRepository, SqliteDeviceStateRepository, SqliteRecordRepository,
};
use crate::error::Result;
use crate::models::{
    ConflictId, DeviceSyncState, NetworkStatus, OfflineRecord, RecordId, ResolutionStrategy,
    SyncConflict, SyncStatus,
};

/// Thread-safe service over the offline database.
#[derive(Clone)]
pub struct StoreService {
    db: Arc<Mutex<Database>>,
}

impl StoreService {
    /// Open a store at the given filesystem path, creating parent directories.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Persist a record; returns only after the write committed.
    pub async fn insert_record(&self, record: &OfflineRecord) -> Result<()> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).insert(record)
    }

    /// Fetch a record by id.
    pub async fn get_record(&self, id: &RecordId) -> Result<Option<OfflineRecord>> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).get(id)
    }

    /// List pending records oldest-first, optionally scoped to a device.
    pub async fn list_pending(&self, device_id: Option<&str>) -> Result<Vec<OfflineRecord>> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).list_pending(device_id)
    }

    /// Claim a pending record for sync.
    pub async fn claim_for_sync(&self, id: &RecordId) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).claim_for_sync(id)
    }

    /// Release a claim without recording an attempt.
    pub async fn release_claim(&self, id: &RecordId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).release_claim(id)
    }

    /// Re-queue a record for sync.
    pub async fn mark_pending(&self, id: &RecordId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).mark_pending(id)
    }

    /// Mark a record synced.
    pub async fn mark_synced(&self, id: &RecordId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).mark_synced(id)
    }

    /// Mark a record conflicted.
    pub async fn mark_conflict(&self, id: &RecordId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).mark_conflict(id)
    }

    /// Record a failed sync attempt and return the resulting status.
    pub async fn mark_sync_failed(&self, id: &RecordId, max_retries: u32) -> Result<SyncStatus> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).mark_sync_failed(id, max_retries)
    }

    /// Move failed records back to pending.
    pub async fn retry_failed(&self, device_id: Option<&str>) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).retry_failed(device_id)
    }

    /// Replace a record's payload (conflict resolution).
    pub async fn update_record_data(
        &self,
        id: &RecordId,
        data: &Value,
        checksum: &str,
    ) -> Result<()> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).update_data(id, data, checksum)
    }

    /// Count pending records for a device.
    pub async fn count_pending(&self, device_id: &str) -> Result<u64> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).count_pending(device_id)
    }

    /// Distinct (device, worker) pairs active since the given timestamp.
    pub async fn active_sessions(&self, since: i64) -> Result<Vec<(String, String)>> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).active_sessions(since)
    }

    /// Whether a recovered record with this origin already exists on a device.
    pub async fn has_origin(&self, device_id: &str, origin_record_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).has_origin(device_id, origin_record_id)
    }

    /// Insert a conflict unless the record already has an unresolved one.
    pub async fn insert_conflict_if_absent(&self, conflict: &SyncConflict) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).insert_if_absent(conflict)
    }

    /// Fetch a conflict by id.
    pub async fn get_conflict(&self, id: &ConflictId) -> Result<Option<SyncConflict>> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).get(id)
    }

    /// The unresolved conflict for a record, if any.
    pub async fn unresolved_conflict_for(
        &self,
        record_id: &RecordId,
    ) -> Result<Option<SyncConflict>> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).unresolved_for(record_id)
    }

    /// List unresolved conflicts oldest-first.
    pub async fn list_unresolved_conflicts(&self) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).list_unresolved()
    }

    /// Count unresolved conflicts.
    pub async fn count_unresolved_conflicts(&self) -> Result<u64> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).count_unresolved()
    }

    /// Mark a conflict resolved; false when it already was.
    pub async fn mark_conflict_resolved(
        &self,
        id: &ConflictId,
        strategy: ResolutionStrategy,
        resolved_by: &str,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).mark_resolved(id, strategy, resolved_by)
    }

    /// Upsert a device's sync state after a cycle.
    pub async fn record_device_cycle(
        &self,
        device_id: &str,
        network_status: NetworkStatus,
        pending_count: u64,
        failed_delta: u64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        SqliteDeviceStateRepository::new(db.connection()).record_cycle(
            device_id,
            network_status,
            pending_count,
            failed_delta,
        )
    }

    /// Fetch a device's sync state.
    pub async fn get_device_state(&self, device_id: &str) -> Result<Option<DeviceSyncState>> {
        let db = self.db.lock().await;
        SqliteDeviceStateRepository::new(db.connection()).get(device_id)
    }
}
