use fieldsync_core::sync::SyncReportStatus;

use crate::commands::common::AppContext;
use crate::error::CliError;

pub async fn run_sync(context: &AppContext, as_json: bool) -> Result<(), CliError> {
    let report = context.engine.sync_when_online().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.status == SyncReportStatus::Offline {
        println!("Remote service unreachable; all work stays queued locally.");
        return Ok(());
    }

    if report.total_records == 0 {
        println!("Nothing pending to sync.");
        return Ok(());
    }

    println!(
        "Synced {}/{} records ({} conflicts, {} failures)",
        report.synced, report.total_records, report.conflicts, report.failures
    );
    for detail in &report.details {
        match &detail.error {
            Some(error) => println!("  {} {} [{}]: {error}", detail.outcome, detail.record_id, detail.record_type),
            None => println!("  {} {} [{}]", detail.outcome, detail.record_id, detail.record_type),
        }
    }
    Ok(())
}

pub async fn run_retry_failed(
    context: &AppContext,
    device: Option<&str>,
) -> Result<(), CliError> {
    let requeued = context.engine.retry_failed_records(device).await?;
    if requeued == 0 {
        println!("No failed records to re-queue.");
    } else {
        println!("Re-queued {requeued} failed records.");
    }
    Ok(())
}
