use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(about = "Offline-first capture and sync for field work data")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional directory for backup/recovery artifacts
    #[arg(long, global = true, value_name = "PATH")]
    pub backup_dir: Option<PathBuf>,

    /// Remote sync service base URL (overrides FIELDSYNC_REMOTE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub remote_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a record for offline use
    #[command(alias = "add")]
    Store {
        /// Record type (inspection, measurement, photo, voice, defect, ...)
        record_type: String,
        /// Record payload as JSON
        data: String,
        /// Worker the record belongs to
        #[arg(long, value_name = "ID")]
        worker: String,
        /// Device the record was captured on
        #[arg(long, value_name = "ID")]
        device: String,
        /// Optional parent record ID
        #[arg(long, value_name = "ID")]
        parent: Option<String>,
        /// Operation against the remote counterpart
        #[arg(long, value_enum, default_value_t = OperationArg::Create)]
        operation: OperationArg,
    },
    /// Sync all pending records with the remote service
    Sync {
        /// Output the sync report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show offline status for a device
    Status {
        /// Device to report on
        device: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List unresolved sync conflicts
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a conflict with an explicit strategy
    Resolve {
        /// Conflict ID
        conflict_id: String,
        /// Strategy to apply: local_wins, remote_wins, or merge
        strategy: String,
    },
    /// Re-queue records that exhausted their sync retries
    RetryFailed {
        /// Limit to a single device
        #[arg(long, value_name = "ID")]
        device: Option<String>,
    },
    /// Recover a failed device's records onto a replacement device
    Recover {
        /// Device that was lost or damaged
        old_device: String,
        /// Replacement device
        new_device: String,
        /// Worker whose records are being recovered
        #[arg(long, value_name = "ID")]
        worker: String,
        /// Output the recovery report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a recovery checkpoint for worker data
    Checkpoint {
        /// Worker the checkpoint belongs to
        #[arg(long, value_name = "ID")]
        worker: String,
        /// Checkpoint payload as JSON
        data: String,
    },
    /// Trigger a synchronous emergency save of all pending work
    Emergency {
        /// Reason tag recorded with the dump
        #[arg(default_value = "MANUAL")]
        reason: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OperationArg {
    Create,
    Update,
    Delete,
}

impl From<OperationArg> for fieldsync_core::Operation {
    fn from(value: OperationArg) -> Self {
        match value {
            OperationArg::Create => Self::Create,
            OperationArg::Update => Self::Update,
            OperationArg::Delete => Self::Delete,
        }
    }
}
