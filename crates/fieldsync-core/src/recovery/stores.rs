//! Recovery tier collaborators.
//!
//! The cloud, peer, and device-health collaborators are traits so
//! deployments can wire real services and tests can inject doubles. The
//! directory-backed cloud store is the default stand-in: it keeps the same
//! upload/fetch contract while writing to a local directory.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::checksum;
use crate::error::{Error, Result};
use crate::models::{CloudBackup, DeviceSnapshot};

/// Cloud backup tier: stores snapshots with their metadata.
#[async_trait]
pub trait CloudBackupStore: Send + Sync {
    /// Upload a snapshot with its backup metadata.
    async fn upload(&self, backup: &CloudBackup, snapshot: &DeviceSnapshot) -> Result<()>;

    /// The most recent backup for a device, with its snapshot payload.
    async fn latest_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<(CloudBackup, DeviceSnapshot)>>;
}

/// Peer tier: other devices on the local network that may hold a copy.
#[async_trait]
pub trait PeerRecovery: Send + Sync {
    /// Ask peers for their latest snapshot of the given device.
    async fn snapshot_for_device(&self, device_id: &str) -> Result<Option<DeviceSnapshot>>;
}

/// Device health telemetry feeding the emergency-save monitor.
pub trait DeviceHealthProbe: Send + Sync {
    /// Battery percentage, if the platform exposes it.
    fn battery_percent(&self) -> Option<f64>;

    /// Free storage in megabytes, if the platform exposes it.
    fn free_storage_mb(&self) -> Option<f64>;
}

/// Directory-backed cloud store.
pub struct DirectoryCloudStore {
    metadata_dir: PathBuf,
    payload_dir: PathBuf,
}

impl DirectoryCloudStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let metadata_dir = root.join("cloud_metadata");
        let payload_dir = root.join("cloud_payloads");
        std::fs::create_dir_all(&metadata_dir)?;
        std::fs::create_dir_all(&payload_dir)?;
        Ok(Self {
            metadata_dir,
            payload_dir,
        })
    }
}

#[async_trait]
impl CloudBackupStore for DirectoryCloudStore {
    async fn upload(&self, backup: &CloudBackup, snapshot: &DeviceSnapshot) -> Result<()> {
        let payload_path = self.payload_dir.join(format!("{}.json", backup.backup_id));
        std::fs::write(&payload_path, serde_json::to_vec(snapshot)?)?;

        let metadata_path = self.metadata_dir.join(format!("{}.json", backup.backup_id));
        std::fs::write(&metadata_path, serde_json::to_vec_pretty(backup)?)?;

        tracing::debug!(
            "Uploaded backup {} for {} ({} records)",
            backup.backup_id,
            backup.device_id,
            backup.records_backed_up
        );
        Ok(())
    }

    async fn latest_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<(CloudBackup, DeviceSnapshot)>> {
        let mut latest: HashMap<String, CloudBackup> = HashMap::new();

        for entry in std::fs::read_dir(&self.metadata_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Ok(bytes) = std::fs::read(entry.path()) else {
                continue;
            };
            let Ok(backup) = serde_json::from_slice::<CloudBackup>(&bytes) else {
                continue;
            };
            if backup.device_id != device_id {
                continue;
            }
            match latest.get(device_id) {
                Some(existing) if existing.backup_timestamp >= backup.backup_timestamp => {}
                _ => {
                    latest.insert(device_id.to_string(), backup);
                }
            }
        }

        let Some(backup) = latest.remove(device_id) else {
            return Ok(None);
        };

        let payload_path = self.payload_dir.join(format!("{}.json", backup.backup_id));
        let payload = std::fs::read(&payload_path)?;
        if checksum::sha256_hex(&payload) != backup.data_hash {
            return Err(Error::Integrity(backup.backup_id));
        }

        let snapshot: DeviceSnapshot = serde_json::from_slice(&payload)?;
        Ok(Some((backup, snapshot)))
    }
}

/// Peer tier stand-in: no peers discovered.
pub struct NoPeers;

#[async_trait]
impl PeerRecovery for NoPeers {
    async fn snapshot_for_device(&self, _device_id: &str) -> Result<Option<DeviceSnapshot>> {
        Ok(None)
    }
}

/// Health probe stand-in for platforms without telemetry.
pub struct NoHealthTelemetry;

impl DeviceHealthProbe for NoHealthTelemetry {
    fn battery_percent(&self) -> Option<f64> {
        None
    }

    fn free_storage_mb(&self) -> Option<f64> {
        None
    }
}
