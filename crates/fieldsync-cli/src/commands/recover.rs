use crate::commands::common::{parse_payload, AppContext};
use crate::error::CliError;

pub async fn run_recover(
    context: &AppContext,
    old_device: &str,
    new_device: &str,
    worker: &str,
    as_json: bool,
) -> Result<(), CliError> {
    let report = context
        .recovery
        .recover_from_device_failure(old_device, new_device, worker)
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.recovered_records == 0 {
        println!("No recoverable records found for {old_device}.");
        return Ok(());
    }

    println!(
        "Recovered {} records onto {} from: {}",
        report.recovered_records,
        report.new_device_id,
        report.sources.join(", ")
    );
    Ok(())
}

pub fn run_checkpoint(context: &AppContext, worker: &str, data: &str) -> Result<(), CliError> {
    let payload = parse_payload(data)?;
    let checkpoint = context.recovery.create_recovery_checkpoint(worker, &payload)?;
    println!(
        "Checkpoint {} created at {}",
        checkpoint.checkpoint_id, checkpoint.timestamp
    );
    Ok(())
}

pub async fn run_emergency(context: &AppContext, reason: &str) -> Result<(), CliError> {
    let save = context.recovery.emergency_save(reason).await?;
    println!(
        "Emergency save {} complete: {} records dumped to {}",
        save.emergency_id, save.record_count, save.path
    );
    Ok(())
}
