//! CLI command implementations

pub mod common;
mod conflicts;
mod recover;
mod status;
mod store;
mod sync;

use crate::cli::{Cli, Commands};
use crate::error::CliError;

/// Dispatch the parsed CLI invocation.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let context = common::open_context(&cli).await?;

    match cli.command {
        Commands::Store {
            ref record_type,
            ref data,
            ref worker,
            ref device,
            ref parent,
            operation,
        } => {
            store::run_store(
                &context,
                record_type,
                data,
                worker,
                device,
                parent.as_deref(),
                operation,
            )
            .await
        }
        Commands::Sync { json } => sync::run_sync(&context, json).await,
        Commands::Status { ref device, json } => status::run_status(&context, device, json).await,
        Commands::Conflicts { json } => conflicts::run_conflicts(&context, json).await,
        Commands::Resolve {
            ref conflict_id,
            ref strategy,
        } => conflicts::run_resolve(&context, conflict_id, strategy).await,
        Commands::RetryFailed { ref device } => {
            sync::run_retry_failed(&context, device.as_deref()).await
        }
        Commands::Recover {
            ref old_device,
            ref new_device,
            ref worker,
            json,
        } => recover::run_recover(&context, old_device, new_device, worker, json).await,
        Commands::Checkpoint {
            ref worker,
            ref data,
        } => recover::run_checkpoint(&context, worker, data),
        Commands::Emergency { ref reason } => recover::run_emergency(&context, reason).await,
    }
}
