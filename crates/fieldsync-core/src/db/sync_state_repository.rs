//! Conflict and device sync state repositories

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{
    ConflictId, DeviceSyncState, NetworkStatus, RecordId, ResolutionStrategy, SyncConflict,
};

const CONFLICT_COLUMNS: &str = "conflict_id, local_record_id, remote_data, conflict_type, \
     resolution_strategy, created_at, resolved_at, resolved_by";

/// Trait for sync conflict storage operations
pub trait ConflictRepository {
    /// Insert a conflict unless an unresolved one already exists for the record
    fn insert_if_absent(&self, conflict: &SyncConflict) -> Result<bool>;

    /// Get a conflict by ID
    fn get(&self, id: &ConflictId) -> Result<Option<SyncConflict>>;

    /// The unresolved conflict for a record, if any
    fn unresolved_for(&self, record_id: &RecordId) -> Result<Option<SyncConflict>>;

    /// List all unresolved conflicts, oldest first
    fn list_unresolved(&self) -> Result<Vec<SyncConflict>>;

    /// Count unresolved conflicts
    fn count_unresolved(&self) -> Result<u64>;

    /// Mark a conflict resolved; returns false if it already was
    fn mark_resolved(
        &self,
        id: &ConflictId,
        strategy: ResolutionStrategy,
        resolved_by: &str,
    ) -> Result<bool>;
}

/// Trait for per-device sync state operations
pub trait DeviceStateRepository {
    /// Upsert a device's state after a sync cycle
    fn record_cycle(
        &self,
        device_id: &str,
        network_status: NetworkStatus,
        pending_count: u64,
        failed_delta: u64,
    ) -> Result<()>;

    /// Get a device's state
    fn get(&self, device_id: &str) -> Result<Option<DeviceSyncState>>;
}

/// `SQLite` implementation of `ConflictRepository`
pub struct SqliteConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConflictRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncConflict> {
        let id: String = row.get(0)?;
        let local_record_id: String = row.get(1)?;
        let conflict_type: String = row.get(3)?;
        let strategy: String = row.get(4)?;
        Ok(SyncConflict {
            id: id.parse().unwrap_or_default(),
            local_record_id: local_record_id.parse().unwrap_or_default(),
            remote_data: row.get(2)?,
            conflict_type: conflict_type
                .parse()
                .unwrap_or(crate::models::ConflictType::Data),
            resolution_strategy: strategy.parse().unwrap_or(ResolutionStrategy::Manual),
            created_at: row.get(5)?,
            resolved_at: row.get(6)?,
            resolved_by: row.get(7)?,
        })
    }
}

impl ConflictRepository for SqliteConflictRepository<'_> {
    fn insert_if_absent(&self, conflict: &SyncConflict) -> Result<bool> {
        // The partial unique index on unresolved conflicts makes this race-free
        let rows = self.conn.execute(
            "INSERT OR IGNORE INTO sync_conflicts
             (conflict_id, local_record_id, remote_data, conflict_type,
              resolution_strategy, created_at, resolved_at, resolved_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                conflict.id.as_str(),
                conflict.local_record_id.as_str(),
                serde_json::to_string(&conflict.remote_data)?,
                conflict.conflict_type.as_str(),
                conflict.resolution_strategy.as_str(),
                conflict.created_at,
                conflict.resolved_at,
                conflict.resolved_by,
            ],
        )?;

        Ok(rows == 1)
    }

    fn get(&self, id: &ConflictId) -> Result<Option<SyncConflict>> {
        let result = self.conn.query_row(
            &format!("SELECT {CONFLICT_COLUMNS} FROM sync_conflicts WHERE conflict_id = ?"),
            params![id.as_str()],
            Self::parse_conflict,
        );

        match result {
            Ok(conflict) => Ok(Some(conflict)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn unresolved_for(&self, record_id: &RecordId) -> Result<Option<SyncConflict>> {
        let result = self.conn.query_row(
            &format!(
                "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts
                 WHERE local_record_id = ? AND resolved_at IS NULL"
            ),
            params![record_id.as_str()],
            Self::parse_conflict,
        );

        match result {
            Ok(conflict) => Ok(Some(conflict)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_unresolved(&self) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts
             WHERE resolved_at IS NULL
             ORDER BY created_at ASC"
        ))?;

        let conflicts = stmt
            .query_map([], Self::parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conflicts)
    }

    fn count_unresolved(&self) -> Result<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_conflicts WHERE resolved_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn mark_resolved(
        &self,
        id: &ConflictId,
        strategy: ResolutionStrategy,
        resolved_by: &str,
    ) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sync_conflicts WHERE conflict_id = ?)",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::NotFound(id.to_string()));
        }

        let now = chrono::Utc::now().timestamp_millis();
        let rows = self.conn.execute(
            "UPDATE sync_conflicts
             SET resolved_at = ?, resolved_by = ?, resolution_strategy = ?
             WHERE conflict_id = ? AND resolved_at IS NULL",
            params![now, resolved_by, strategy.as_str(), id.as_str()],
        )?;

        Ok(rows == 1)
    }
}

/// `SQLite` implementation of `DeviceStateRepository`
pub struct SqliteDeviceStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteDeviceStateRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl DeviceStateRepository for SqliteDeviceStateRepository<'_> {
    fn record_cycle(
        &self,
        device_id: &str,
        network_status: NetworkStatus,
        pending_count: u64,
        failed_delta: u64,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();

        self.conn.execute(
            "INSERT INTO device_sync_state
             (device_id, last_sync_timestamp, network_status,
              pending_records_count, failed_syncs_count)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(device_id) DO UPDATE SET
                 last_sync_timestamp = excluded.last_sync_timestamp,
                 network_status = excluded.network_status,
                 pending_records_count = excluded.pending_records_count,
                 failed_syncs_count =
                     device_sync_state.failed_syncs_count + excluded.failed_syncs_count",
            params![
                device_id,
                now,
                network_status.as_str(),
                pending_count,
                failed_delta,
            ],
        )?;

        Ok(())
    }

    fn get(&self, device_id: &str) -> Result<Option<DeviceSyncState>> {
        let result = self.conn.query_row(
            "SELECT device_id, last_sync_timestamp, network_status,
                    pending_records_count, failed_syncs_count
             FROM device_sync_state WHERE device_id = ?",
            params![device_id],
            |row| {
                let status: String = row.get(2)?;
                Ok(DeviceSyncState {
                    device_id: row.get(0)?,
                    last_sync_timestamp: row.get(1)?,
                    network_status: status.parse().unwrap_or(NetworkStatus::Offline),
                    pending_records_count: row.get(3)?,
                    failed_syncs_count: row.get(4)?,
                })
            },
        );

        match result {
            Ok(state) => Ok(Some(state)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::ConflictType;
    use serde_json::json;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn sample_conflict(record_id: RecordId) -> SyncConflict {
        SyncConflict::new(
            record_id,
            json!({"status": "approved"}),
            ConflictType::Data,
            ResolutionStrategy::Manual,
        )
    }

    #[test]
    fn test_insert_and_list_unresolved() {
        let db = setup();
        let repo = SqliteConflictRepository::new(db.connection());

        let conflict = sample_conflict(RecordId::new());
        assert!(repo.insert_if_absent(&conflict).unwrap());

        let unresolved = repo.list_unresolved().unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].id, conflict.id);
        assert_eq!(repo.count_unresolved().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_unresolved_conflict_is_ignored() {
        let db = setup();
        let repo = SqliteConflictRepository::new(db.connection());

        let record_id = RecordId::new();
        assert!(repo.insert_if_absent(&sample_conflict(record_id)).unwrap());
        assert!(!repo.insert_if_absent(&sample_conflict(record_id)).unwrap());
        assert_eq!(repo.count_unresolved().unwrap(), 1);
    }

    #[test]
    fn test_resolving_allows_a_new_conflict() {
        let db = setup();
        let repo = SqliteConflictRepository::new(db.connection());

        let record_id = RecordId::new();
        let conflict = sample_conflict(record_id);
        repo.insert_if_absent(&conflict).unwrap();

        assert!(repo
            .mark_resolved(&conflict.id, ResolutionStrategy::RemoteWins, "operator")
            .unwrap());
        // Resolving twice is a no-op
        assert!(!repo
            .mark_resolved(&conflict.id, ResolutionStrategy::RemoteWins, "operator")
            .unwrap());
        assert_eq!(repo.count_unresolved().unwrap(), 0);

        // A fresh conflict for the same record is allowed again
        assert!(repo.insert_if_absent(&sample_conflict(record_id)).unwrap());
    }

    #[test]
    fn test_resolving_missing_conflict_errors() {
        let db = setup();
        let repo = SqliteConflictRepository::new(db.connection());

        let err = repo
            .mark_resolved(&ConflictId::new(), ResolutionStrategy::Merge, "operator")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_device_state_accumulates_failures() {
        let db = setup();
        let repo = SqliteDeviceStateRepository::new(db.connection());

        repo.record_cycle("tablet-01", NetworkStatus::Online, 4, 1)
            .unwrap();
        repo.record_cycle("tablet-01", NetworkStatus::Online, 2, 2)
            .unwrap();

        let state = repo.get("tablet-01").unwrap().unwrap();
        assert_eq!(state.pending_records_count, 2);
        assert_eq!(state.failed_syncs_count, 3);
        assert_eq!(state.network_status, NetworkStatus::Online);
        assert!(state.last_sync_timestamp.is_some());

        assert!(repo.get("tablet-99").unwrap().is_none());
    }
}
