//! Shared wiring and formatting helpers for CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use fieldsync_core::recovery::{
    DeviceRecoverySystem, DirectoryCloudStore, NoHealthTelemetry, NoPeers,
};
use fieldsync_core::sync::{
    ConnectivityProbe, HttpConnectivityProbe, HttpSyncTarget, SyncEngine, SyncTarget,
};
use fieldsync_core::{EngineConfig, RecoveryConfig, StoreService};

use crate::cli::Cli;
use crate::error::CliError;

const REMOTE_URL_ENV: &str = "FIELDSYNC_REMOTE_URL";
const DEFAULT_REMOTE_URL: &str = "http://localhost:8080/api";

/// Fully wired engine + recovery system for one CLI invocation.
pub struct AppContext {
    pub engine: Arc<SyncEngine>,
    pub recovery: Arc<DeviceRecoverySystem>,
}

/// Open the store and wire the engine and recovery system from CLI options.
pub async fn open_context(cli: &Cli) -> Result<AppContext, CliError> {
    let data_dir = default_data_dir(cli)?;
    let db_path = cli
        .db_path
        .clone()
        .unwrap_or_else(|| data_dir.join("fieldsync.db"));
    let backup_dir = cli
        .backup_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("backups"));
    let remote_url = resolve_remote_url(cli.remote_url.clone());

    let config = EngineConfig::new(remote_url);
    let store = StoreService::open_path(&db_path).await?;

    let probe: Arc<dyn ConnectivityProbe> = Arc::new(HttpConnectivityProbe::new(
        &config.status_url,
        config.request_timeout,
    )?);
    let remote: Arc<dyn SyncTarget> = Arc::new(HttpSyncTarget::new(
        &config.remote_base_url,
        config.request_timeout,
    )?);

    let engine = SyncEngine::new(
        store.clone(),
        Arc::clone(&probe),
        Arc::clone(&remote),
        config,
    );
    let recovery = DeviceRecoverySystem::new(
        store,
        probe,
        remote,
        Arc::new(DirectoryCloudStore::new(&backup_dir)?),
        Arc::new(NoPeers),
        Arc::new(NoHealthTelemetry),
        RecoveryConfig::new(backup_dir),
    )?;

    Ok(AppContext { engine, recovery })
}

fn default_data_dir(cli: &Cli) -> Result<PathBuf, CliError> {
    // Only needed when neither path override is present
    if cli.db_path.is_some() && cli.backup_dir.is_some() {
        return Ok(PathBuf::new());
    }
    dirs::data_dir()
        .map(|dir| dir.join("fieldsync"))
        .ok_or(CliError::NoDataDir)
}

/// Pick the remote URL from flag, environment, or the built-in default.
pub fn resolve_remote_url(flag: Option<String>) -> String {
    flag.map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .or_else(|| std::env::var(REMOTE_URL_ENV).ok())
        .unwrap_or_else(|| DEFAULT_REMOTE_URL.to_string())
}

/// Parse a CLI JSON payload argument.
pub fn parse_payload(raw: &str) -> Result<serde_json::Value, CliError> {
    serde_json::from_str(raw).map_err(|error| CliError::InvalidPayload(error.to_string()))
}

/// Render a Unix-ms timestamp for terminal output.
pub fn format_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}
