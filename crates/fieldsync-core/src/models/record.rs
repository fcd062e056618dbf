//! Offline record model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::checksum;
use crate::error::Error;

/// A unique identifier for an offline record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of work a record captures; selects the sync strategy.
///
/// Open-ended on purpose: unknown types sync through the generic strategy
/// so new record kinds can ship without an engine release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordType {
    Inspection,
    Measurement,
    Photo,
    Voice,
    Defect,
    Other(String),
}

impl RecordType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Inspection => "inspection",
            Self::Measurement => "measurement",
            Self::Photo => "photo",
            Self::Voice => "voice",
            Self::Defect => "defect",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for RecordType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "inspection" => Self::Inspection,
            "measurement" => Self::Measurement,
            "photo" => Self::Photo,
            "voice" => Self::Voice,
            "defect" => Self::Defect,
            _ => Self::Other(value),
        }
    }
}

impl From<RecordType> for String {
    fn from(value: RecordType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync lifecycle state of a record.
///
/// `Syncing` is a transient claim marker used to keep the background
/// scheduler and explicit sync calls from sending the same record twice;
/// it always settles back to one of the other states within a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Synced,
    Conflict,
    Failed,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("unknown sync status: {other}"))),
        }
    }
}

/// Operation a record applies to its remote counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown operation: {other}"))),
        }
    }
}

/// A unit of offline work captured on a device.
///
/// Records are append-only: the engine only ever transitions `sync_status`,
/// never deletes rows, so the table doubles as an audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineRecord {
    /// Unique identifier
    pub id: RecordId,
    /// Kind of work captured; selects the sync strategy
    pub record_type: RecordType,
    /// Opaque payload; the engine only inspects conflict-sensitive fields
    pub data: Value,
    /// Creation timestamp (Unix ms), authoritative for per-device ordering
    pub timestamp: i64,
    /// Worker who captured the record
    pub worker_id: String,
    /// Device the record was captured on
    pub device_id: String,
    /// SHA-256 of the canonicalized payload
    pub checksum: String,
    /// Sync lifecycle state
    pub sync_status: SyncStatus,
    /// Optional ownership link (e.g. a measurement's parent inspection)
    pub parent_record_id: Option<RecordId>,
    /// Operation against the remote counterpart
    pub operation: Operation,
    /// Remote failures so far; bounded by the engine's retry limit
    pub retry_count: u32,
    /// Last sync attempt (Unix ms)
    pub last_sync_attempt: Option<i64>,
    /// Original record ID when this row was restored by device recovery
    pub origin_record_id: Option<String>,
}

impl OfflineRecord {
    /// Create a new pending record, computing its payload checksum.
    #[must_use]
    pub fn new(
        record_type: RecordType,
        data: Value,
        worker_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        let checksum = checksum::record_checksum(&data);
        Self {
            id: RecordId::new(),
            record_type,
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
            worker_id: worker_id.into(),
            device_id: device_id.into(),
            checksum,
            sync_status: SyncStatus::Pending,
            parent_record_id: None,
            operation: Operation::Create,
            retry_count: 0,
            last_sync_attempt: None,
            origin_record_id: None,
        }
    }

    /// Link this record to a parent record.
    #[must_use]
    pub const fn with_parent(mut self, parent: RecordId) -> Self {
        self.parent_record_id = Some(parent);
        self
    }

    /// Set the remote operation.
    #[must_use]
    pub const fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    /// Record the ID this row was recovered from.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin_record_id = Some(origin.into());
        self
    }

    /// Check the stored checksum against the payload.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        checksum::verify(&self.data, &self.checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_unique() {
        let id1 = RecordId::new();
        let id2 = RecordId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_record_id_parse() {
        let id = RecordId::new();
        let parsed: RecordId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_new_record_is_pending_with_valid_checksum() {
        let record = OfflineRecord::new(
            RecordType::Inspection,
            json!({"line": "A", "status": "in_progress"}),
            "worker-7",
            "tablet-01",
        );
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.operation, Operation::Create);
        assert_eq!(record.retry_count, 0);
        assert!(record.verify_checksum());
        assert!(record.timestamp > 0);
    }

    #[test]
    fn test_record_type_round_trips_unknown_values() {
        let custom = RecordType::from("calibration".to_string());
        assert_eq!(custom, RecordType::Other("calibration".to_string()));
        assert_eq!(custom.as_str(), "calibration");
        assert_eq!(RecordType::from("photo".to_string()), RecordType::Photo);
    }

    #[test]
    fn test_sync_status_parse() {
        assert_eq!("pending".parse::<SyncStatus>().unwrap(), SyncStatus::Pending);
        assert_eq!("failed".parse::<SyncStatus>().unwrap(), SyncStatus::Failed);
        assert!("bogus".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_builder_helpers() {
        let parent = RecordId::new();
        let record = OfflineRecord::new(RecordType::Measurement, json!({"value": 1}), "w", "d")
            .with_parent(parent)
            .with_operation(Operation::Update)
            .with_origin("old-id");
        assert_eq!(record.parent_record_id, Some(parent));
        assert_eq!(record.operation, Operation::Update);
        assert_eq!(record.origin_record_id.as_deref(), Some("old-id"));
    }
}
