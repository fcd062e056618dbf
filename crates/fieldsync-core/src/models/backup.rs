//! Backup and recovery artifacts

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::record::{OfflineRecord, Operation, RecordType};

/// One record inside a device snapshot.
///
/// Carries the original record ID and checksum so recovery can verify
/// integrity and keep provenance when re-inserting under a new device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub record_id: String,
    pub record_type: RecordType,
    pub data: Value,
    pub timestamp: i64,
    pub worker_id: String,
    pub checksum: String,
    pub operation: Operation,
    pub parent_record_id: Option<String>,
}

impl From<&OfflineRecord> for SnapshotRecord {
    fn from(record: &OfflineRecord) -> Self {
        Self {
            record_id: record.id.as_str(),
            record_type: record.record_type.clone(),
            data: record.data.clone(),
            timestamp: record.timestamp,
            worker_id: record.worker_id.clone(),
            checksum: record.checksum.clone(),
            operation: record.operation,
            parent_record_id: record.parent_record_id.as_ref().map(super::record::RecordId::as_str),
        }
    }
}

/// Point-in-time snapshot of a device's pending records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub savepoint_id: String,
    pub device_id: String,
    pub worker_id: String,
    pub created_at: i64,
    pub records: Vec<SnapshotRecord>,
}

impl DeviceSnapshot {
    /// Build a snapshot from a device's pending records, oldest first.
    #[must_use]
    pub fn new(
        device_id: impl Into<String>,
        worker_id: impl Into<String>,
        records: &[OfflineRecord],
    ) -> Self {
        let mut records: Vec<SnapshotRecord> = records.iter().map(SnapshotRecord::from).collect();
        records.sort_by_key(|record| record.timestamp);
        Self {
            savepoint_id: Uuid::now_v7().to_string(),
            device_id: device_id.into(),
            worker_id: worker_id.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
            records,
        }
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// Metadata for a completed autosave tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSavePoint {
    pub savepoint_id: String,
    pub device_id: String,
    pub worker_id: String,
    pub timestamp: i64,
    pub record_count: usize,
    pub path: String,
}

/// Metadata for a snapshot pushed to the cloud tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudBackup {
    pub backup_id: String,
    pub device_id: String,
    pub backup_timestamp: i64,
    /// SHA-256 of the serialized snapshot payload
    pub data_hash: String,
    pub backup_location: String,
    pub size_bytes: u64,
    pub records_backed_up: usize,
    pub encryption_key_id: String,
}

/// Standalone checkpoint created on explicit caller request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryCheckpoint {
    pub checkpoint_id: String,
    pub worker_id: String,
    pub timestamp: i64,
    pub data_hash: String,
}

/// Result of a synchronous emergency dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencySave {
    pub emergency_id: String,
    pub reason: String,
    pub timestamp: i64,
    pub record_count: usize,
    pub path: String,
}

/// Overall outcome of a device recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Success,
    Failed,
}

/// Accumulated result of `recover_from_device_failure`.
///
/// Tiers accumulate rather than short-circuit: each tier that restored at
/// least one record adds its count and its name to `sources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub old_device_id: String,
    pub new_device_id: String,
    pub worker_id: String,
    pub recovered_records: usize,
    pub sources: Vec<String>,
    pub status: RecoveryStatus,
}

impl RecoveryReport {
    #[must_use]
    pub fn new(
        old_device_id: impl Into<String>,
        new_device_id: impl Into<String>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            old_device_id: old_device_id.into(),
            new_device_id: new_device_id.into(),
            worker_id: worker_id.into(),
            recovered_records: 0,
            sources: Vec::new(),
            status: RecoveryStatus::Failed,
        }
    }

    /// Record a tier's contribution; zero-record tiers are not listed.
    pub fn add_source(&mut self, source: &str, records: usize) {
        if records > 0 {
            self.recovered_records += records;
            self.sources.push(source.to_string());
            self.status = RecoveryStatus::Success;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_orders_records_oldest_first() {
        let mut newer = OfflineRecord::new(RecordType::Measurement, json!({"v": 2}), "w", "d");
        newer.timestamp = 2_000;
        let mut older = OfflineRecord::new(RecordType::Inspection, json!({"v": 1}), "w", "d");
        older.timestamp = 1_000;

        let snapshot = DeviceSnapshot::new("d", "w", &[newer, older]);
        assert_eq!(snapshot.record_count(), 2);
        assert_eq!(snapshot.records[0].timestamp, 1_000);
        assert_eq!(snapshot.records[1].timestamp, 2_000);
    }

    #[test]
    fn test_recovery_report_accumulates_sources() {
        let mut report = RecoveryReport::new("old", "new", "w");
        assert_eq!(report.status, RecoveryStatus::Failed);

        report.add_source("local_backup", 3);
        report.add_source("peer_devices", 0);
        report.add_source("cloud_backup", 2);

        assert_eq!(report.recovered_records, 5);
        assert_eq!(report.sources, vec!["local_backup", "cloud_backup"]);
        assert_eq!(report.status, RecoveryStatus::Success);
    }
}
