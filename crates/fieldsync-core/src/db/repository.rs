//! Offline record repository

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{OfflineRecord, RecordId, SyncStatus};

const RECORD_COLUMNS: &str = "record_id, record_type, data, timestamp, worker_id, device_id, \
     checksum, sync_status, parent_record_id, operation, retry_count, last_sync_attempt, \
     origin_record_id";

/// Trait for offline record storage operations
pub trait RecordRepository {
    /// Persist a new record; rejects payloads whose checksum does not verify
    fn insert(&self, record: &OfflineRecord) -> Result<()>;

    /// Get a record by ID
    fn get(&self, id: &RecordId) -> Result<Option<OfflineRecord>>;

    /// List pending records, oldest first (optionally scoped to a device)
    fn list_pending(&self, device_id: Option<&str>) -> Result<Vec<OfflineRecord>>;

    /// Claim a pending record for sync (compare-and-set pending -> syncing)
    fn claim_for_sync(&self, id: &RecordId) -> Result<bool>;

    /// Release a claim without an attempt (syncing -> pending)
    fn release_claim(&self, id: &RecordId) -> Result<()>;

    /// Re-queue a record for sync
    fn mark_pending(&self, id: &RecordId) -> Result<()>;

    /// Mark a record as synced
    fn mark_synced(&self, id: &RecordId) -> Result<()>;

    /// Mark a record as conflicted
    fn mark_conflict(&self, id: &RecordId) -> Result<()>;

    /// Record a failed attempt; escalates to `failed` at the retry limit
    fn mark_sync_failed(&self, id: &RecordId, max_retries: u32) -> Result<SyncStatus>;

    /// Move failed records back to pending, resetting their retry counts
    fn retry_failed(&self, device_id: Option<&str>) -> Result<usize>;

    /// Replace a record's payload and checksum (conflict resolution)
    fn update_data(&self, id: &RecordId, data: &serde_json::Value, checksum: &str) -> Result<()>;

    /// Count pending records for a device
    fn count_pending(&self, device_id: &str) -> Result<u64>;

    /// Distinct (device, worker) pairs with records newer than `since`
    fn active_sessions(&self, since: i64) -> Result<Vec<(String, String)>>;

    /// Whether a record recovered from `origin_record_id` already exists on a device
    fn has_origin(&self, device_id: &str, origin_record_id: &str) -> Result<bool>;
}

/// `SQLite` implementation of `RecordRepository`
pub struct SqliteRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a record from a database row
    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<OfflineRecord> {
        let id: String = row.get(0)?;
        let record_type: String = row.get(1)?;
        let sync_status: String = row.get(7)?;
        let parent: Option<String> = row.get(8)?;
        let operation: String = row.get(9)?;
        Ok(OfflineRecord {
            id: id.parse().unwrap_or_default(),
            record_type: record_type.into(),
            data: row.get(2)?,
            timestamp: row.get(3)?,
            worker_id: row.get(4)?,
            device_id: row.get(5)?,
            checksum: row.get(6)?,
            sync_status: sync_status.parse().unwrap_or(SyncStatus::Pending),
            parent_record_id: parent.and_then(|value| value.parse().ok()),
            operation: operation
                .parse()
                .unwrap_or(crate::models::Operation::Create),
            retry_count: row.get(10)?,
            last_sync_attempt: row.get(11)?,
            origin_record_id: row.get(12)?,
        })
    }

    fn set_status(&self, id: &RecordId, status: SyncStatus) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE offline_records SET sync_status = ? WHERE record_id = ?",
            params![status.as_str(), id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn insert(&self, record: &OfflineRecord) -> Result<()> {
        if !record.verify_checksum() {
            return Err(Error::Integrity(record.id.to_string()));
        }

        self.conn.execute(
            "INSERT INTO offline_records
             (record_id, record_type, data, timestamp, worker_id, device_id,
              checksum, sync_status, parent_record_id, operation, retry_count,
              last_sync_attempt, origin_record_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id.as_str(),
                record.record_type.as_str(),
                serde_json::to_string(&record.data)?,
                record.timestamp,
                record.worker_id,
                record.device_id,
                record.checksum,
                record.sync_status.as_str(),
                record.parent_record_id.as_ref().map(RecordId::as_str),
                record.operation.as_str(),
                record.retry_count,
                record.last_sync_attempt,
                record.origin_record_id,
            ],
        )?;

        Ok(())
    }

    fn get(&self, id: &RecordId) -> Result<Option<OfflineRecord>> {
        let result = self.conn.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM offline_records WHERE record_id = ?"),
            params![id.as_str()],
            Self::parse_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_pending(&self, device_id: Option<&str>) -> Result<Vec<OfflineRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM offline_records
             WHERE sync_status = 'pending' AND (?1 IS NULL OR device_id = ?1)
             ORDER BY timestamp ASC, rowid ASC"
        ))?;

        let records = stmt
            .query_map(params![device_id], Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn claim_for_sync(&self, id: &RecordId) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();

        let rows = self.conn.execute(
            "UPDATE offline_records
             SET sync_status = 'syncing', last_sync_attempt = ?
             WHERE record_id = ? AND sync_status = 'pending'",
            params![now, id.as_str()],
        )?;

        Ok(rows == 1)
    }

    fn release_claim(&self, id: &RecordId) -> Result<()> {
        self.conn.execute(
            "UPDATE offline_records SET sync_status = 'pending'
             WHERE record_id = ? AND sync_status = 'syncing'",
            params![id.as_str()],
        )?;
        Ok(())
    }

    fn mark_pending(&self, id: &RecordId) -> Result<()> {
        self.set_status(id, SyncStatus::Pending)
    }

    fn mark_synced(&self, id: &RecordId) -> Result<()> {
        self.set_status(id, SyncStatus::Synced)
    }

    fn mark_conflict(&self, id: &RecordId) -> Result<()> {
        self.set_status(id, SyncStatus::Conflict)
    }

    fn mark_sync_failed(&self, id: &RecordId, max_retries: u32) -> Result<SyncStatus> {
        let now = chrono::Utc::now().timestamp_millis();

        let rows = self.conn.execute(
            "UPDATE offline_records
             SET retry_count = retry_count + 1,
                 last_sync_attempt = ?,
                 sync_status = CASE
                     WHEN retry_count + 1 >= ? THEN 'failed'
                     ELSE 'pending'
                 END
             WHERE record_id = ?",
            params![now, max_retries, id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        let status: String = self.conn.query_row(
            "SELECT sync_status FROM offline_records WHERE record_id = ?",
            params![id.as_str()],
            |row| row.get(0),
        )?;

        status.parse()
    }

    fn retry_failed(&self, device_id: Option<&str>) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE offline_records
             SET sync_status = 'pending', retry_count = 0
             WHERE sync_status = 'failed' AND (?1 IS NULL OR device_id = ?1)",
            params![device_id],
        )?;
        Ok(rows)
    }

    fn update_data(&self, id: &RecordId, data: &serde_json::Value, checksum: &str) -> Result<()> {
        if !crate::checksum::verify(data, checksum) {
            return Err(Error::Integrity(id.to_string()));
        }

        let rows = self.conn.execute(
            "UPDATE offline_records SET data = ?, checksum = ? WHERE record_id = ?",
            params![serde_json::to_string(data)?, checksum, id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn count_pending(&self, device_id: &str) -> Result<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM offline_records
             WHERE device_id = ? AND sync_status = 'pending'",
            params![device_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn active_sessions(&self, since: i64) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT device_id, worker_id FROM offline_records WHERE timestamp > ?",
        )?;

        let sessions = stmt
            .query_map(params![since], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(sessions)
    }

    fn has_origin(&self, device_id: &str, origin_record_id: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM offline_records
                WHERE device_id = ? AND origin_record_id = ?
            )",
            params![device_id, origin_record_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}
