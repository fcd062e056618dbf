use fieldsync_core::{RecordId, RecordType};

use crate::cli::OperationArg;
use crate::commands::common::{parse_payload, AppContext};
use crate::error::CliError;

pub async fn run_store(
    context: &AppContext,
    record_type: &str,
    data: &str,
    worker: &str,
    device: &str,
    parent: Option<&str>,
    operation: OperationArg,
) -> Result<(), CliError> {
    let payload = parse_payload(data)?;
    let parent_record_id = parent
        .map(|raw| {
            raw.parse::<RecordId>()
                .map_err(|_| CliError::InvalidRecordId(raw.to_string()))
        })
        .transpose()?;

    let record_id = context
        .engine
        .store_offline_record(
            RecordType::from(record_type.to_string()),
            payload,
            worker,
            device,
            parent_record_id,
            operation.into(),
        )
        .await?;

    println!("Stored record {record_id}");
    Ok(())
}
