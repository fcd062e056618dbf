//! Engine and recovery configuration

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the sync engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the remote sync service
    pub remote_base_url: String,
    /// URL probed to decide whether the remote service is reachable
    pub status_url: String,
    /// Timeout applied to every network-bound operation
    pub request_timeout: Duration,
    /// Background sync drain interval (default: 30 seconds)
    pub sync_interval: Duration,
    /// Remote failures tolerated before a record escalates to `failed`
    pub max_sync_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            remote_base_url: "http://localhost:8080/api".to_string(),
            status_url: "http://localhost:8080/api/system/status".to_string(),
            request_timeout: Duration::from_secs(10),
            sync_interval: Duration::from_secs(30),
            max_sync_retries: 5,
        }
    }
}

impl EngineConfig {
    /// Create a configuration for the given remote service base URL.
    ///
    /// The status probe defaults to `<base>/system/status`.
    pub fn new(remote_base_url: impl Into<String>) -> Self {
        let remote_base_url = remote_base_url.into();
        let remote_base_url = remote_base_url.trim_end_matches('/').to_string();
        Self {
            status_url: format!("{remote_base_url}/system/status"),
            remote_base_url,
            ..Self::default()
        }
    }

    /// Set the background sync drain interval.
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Set the network request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the bounded retry limit.
    #[must_use]
    pub const fn with_max_sync_retries(mut self, retries: u32) -> Self {
        self.max_sync_retries = retries;
        self
    }
}

/// Configuration for the backup/recovery subsystem
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Root directory for snapshot, emergency, and checkpoint artifacts
    pub backup_dir: PathBuf,
    /// Autosave tick interval (default: 30 seconds)
    pub autosave_interval: Duration,
    /// Cloud backup tick interval (default: 5 minutes)
    pub cloud_interval: Duration,
    /// Device health monitor interval (default: 10 seconds)
    pub monitor_interval: Duration,
    /// How far back a record keeps a device session "active" for autosave
    pub active_session_window: Duration,
    /// Storage location tag stamped on cloud backups
    pub backup_location: String,
    /// Encryption key identifier stamped on cloud backups
    pub encryption_key_id: String,
}

impl RecoveryConfig {
    /// Create a configuration rooted at the given backup directory.
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            autosave_interval: Duration::from_secs(30),
            cloud_interval: Duration::from_secs(300),
            monitor_interval: Duration::from_secs(10),
            active_session_window: Duration::from_secs(3600),
            backup_location: "fieldsync_cloud".to_string(),
            encryption_key_id: "AES256-KEY-001".to_string(),
        }
    }

    /// Set the autosave tick interval.
    #[must_use]
    pub const fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval = interval;
        self
    }

    /// Set the cloud backup tick interval.
    #[must_use]
    pub const fn with_cloud_interval(mut self, interval: Duration) -> Self {
        self.cloud_interval = interval;
        self
    }
}
