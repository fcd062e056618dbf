use fieldsync_core::models::ConflictId;
use fieldsync_core::ResolutionStrategy;

use crate::commands::common::{format_timestamp, AppContext};
use crate::error::CliError;

pub async fn run_conflicts(context: &AppContext, as_json: bool) -> Result<(), CliError> {
    let conflicts = context.engine.list_unresolved_conflicts().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No unresolved conflicts.");
        return Ok(());
    }

    for conflict in &conflicts {
        println!(
            "{}  record {}  {}  suggested: {}  detected {}",
            conflict.id,
            conflict.local_record_id,
            conflict.conflict_type.as_str(),
            conflict.resolution_strategy,
            format_timestamp(conflict.created_at)
        );
    }
    Ok(())
}

pub async fn run_resolve(
    context: &AppContext,
    conflict_id: &str,
    strategy: &str,
) -> Result<(), CliError> {
    let conflict_id = conflict_id
        .parse::<ConflictId>()
        .map_err(|_| CliError::InvalidConflictId(conflict_id.to_string()))?;
    let strategy = strategy.parse::<ResolutionStrategy>()?;

    context.engine.resolve_conflict(conflict_id, strategy).await?;
    println!("Conflict {conflict_id} resolved via {strategy}");
    Ok(())
}
