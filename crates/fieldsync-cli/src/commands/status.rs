use crate::commands::common::{format_timestamp, AppContext};
use crate::error::CliError;

pub async fn run_status(context: &AppContext, device: &str, as_json: bool) -> Result<(), CliError> {
    let status = context.engine.get_offline_status(device).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Device {}", status.device_id);
    println!("  network:              {}", status.network_status);
    println!("  pending records:      {}", status.pending_records);
    println!("  unresolved conflicts: {}", status.unresolved_conflicts);
    match status.last_sync {
        Some(last_sync) => println!("  last sync:            {}", format_timestamp(last_sync)),
        None => println!("  last sync:            never"),
    }
    Ok(())
}
