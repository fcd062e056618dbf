//! Per-device sync state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Last observed reachability of the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl FromStr for NetworkStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            other => Err(Error::InvalidInput(format!(
                "unknown network status: {other}"
            ))),
        }
    }
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted per-device counters, updated after every sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSyncState {
    /// Device identifier
    pub device_id: String,
    /// Last successful sync cycle (Unix ms)
    pub last_sync_timestamp: Option<i64>,
    /// Network status observed at the last cycle
    pub network_status: NetworkStatus,
    /// Pending records at the last cycle
    pub pending_records_count: u64,
    /// Cumulative failed sync attempts
    pub failed_syncs_count: u64,
}

/// Snapshot returned to status-reporting callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineStatus {
    pub device_id: String,
    pub network_status: NetworkStatus,
    pub pending_records: u64,
    pub unresolved_conflicts: u64,
    pub last_sync: Option<i64>,
    pub can_work_offline: bool,
}
