//! Offline sync engine.
//!
//! Orchestrates the push of pending local records to the remote service,
//! dispatching each record through a type-specific strategy and routing
//! detected conflicts to the resolver policy. Offline is an expected steady
//! state: sync operations return a structured "offline" report instead of
//! erroring when the remote is unreachable.

pub mod remote;
pub mod resolver;
mod scheduler;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::checksum;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{
    ConflictId, ConflictType, NetworkStatus, OfflineRecord, OfflineStatus, Operation, RecordId,
    RecordType, ResolutionStrategy, SyncConflict, SyncStatus,
};
use crate::store::StoreService;

pub use remote::{
    ConnectivityProbe, HttpConnectivityProbe, HttpSyncTarget, RemoteRecord, SyncTarget,
};
pub use scheduler::SyncScheduler;

/// Fields compared when deciding whether a remote edit conflicts with ours.
///
/// The union of the resolver's policy categories plus the attachment-style
/// fields (`defects`, `photos`) that always need a human decision.
const CONFLICT_FIELDS: [&str; 14] = [
    "safety_status",
    "hazard_level",
    "compliance_status",
    "measurements",
    "readings",
    "sensor_data",
    "status",
    "completion_status",
    "approval_status",
    "notes",
    "comments",
    "observations",
    "defects",
    "photos",
];

/// Overall outcome of a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReportStatus {
    /// The cycle ran (possibly over zero records)
    Completed,
    /// The remote was unreachable; nothing was attempted
    Offline,
}

/// Per-record outcome inside a [`SyncReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncDetail {
    pub record_id: String,
    pub record_type: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncDetail {
    fn new(record: &OfflineRecord, outcome: &str, error: Option<String>) -> Self {
        Self {
            record_id: record.id.as_str(),
            record_type: record.record_type.as_str().to_string(),
            outcome: outcome.to_string(),
            error,
        }
    }
}

/// Aggregated result of a sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub status: SyncReportStatus,
    pub total_records: usize,
    pub synced: usize,
    pub conflicts: usize,
    pub failures: usize,
    pub details: Vec<SyncDetail>,
}

impl SyncReport {
    fn completed() -> Self {
        Self {
            status: SyncReportStatus::Completed,
            total_records: 0,
            synced: 0,
            conflicts: 0,
            failures: 0,
            details: Vec::new(),
        }
    }

    /// The structured "nothing attempted, remote unreachable" result.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            status: SyncReportStatus::Offline,
            ..Self::completed()
        }
    }
}

/// What a type-specific strategy decided for one record.
enum StrategyOutcome {
    Synced,
    Conflict {
        remote_data: Value,
        changed_fields: Vec<String>,
    },
}

/// The offline-first sync engine.
///
/// Constructed with injected collaborators (store handle, connectivity
/// probe, remote target) so callers and tests control the wiring; there is
/// no ambient global instance.
pub struct SyncEngine {
    store: StoreService,
    probe: Arc<dyn ConnectivityProbe>,
    remote: Arc<dyn SyncTarget>,
    config: EngineConfig,
    queue_tx: mpsc::UnboundedSender<RecordId>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<RecordId>>,
    drain_lock: Mutex<()>,
}

impl SyncEngine {
    /// Create an engine over the given store and collaborators.
    pub fn new(
        store: StoreService,
        probe: Arc<dyn ConnectivityProbe>,
        remote: Arc<dyn SyncTarget>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            store,
            probe,
            remote,
            config,
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            drain_lock: Mutex::new(()),
        })
    }

    /// The store handle this engine writes through.
    #[must_use]
    pub const fn store(&self) -> &StoreService {
        &self.store
    }

    /// Start the background sync scheduler for this engine.
    ///
    /// The returned handle owns the task; call [`SyncScheduler::shutdown`]
    /// to stop it.
    #[must_use]
    pub fn start_scheduler(self: &Arc<Self>) -> SyncScheduler {
        SyncScheduler::spawn(Arc::clone(self), self.config.sync_interval)
    }

    /// Store a record for offline use.
    ///
    /// Returns only after the record is durably committed. When the remote
    /// is currently reachable the record is also queued for background sync;
    /// the enqueue never blocks or fails the store.
    pub async fn store_offline_record(
        &self,
        record_type: RecordType,
        data: Value,
        worker_id: &str,
        device_id: &str,
        parent_record_id: Option<RecordId>,
        operation: Operation,
    ) -> Result<RecordId> {
        if worker_id.trim().is_empty() {
            return Err(Error::InvalidInput("worker_id cannot be empty".to_string()));
        }
        if device_id.trim().is_empty() {
            return Err(Error::InvalidInput("device_id cannot be empty".to_string()));
        }

        let mut record =
            OfflineRecord::new(record_type, data, worker_id, device_id).with_operation(operation);
        if let Some(parent) = parent_record_id {
            record = record.with_parent(parent);
        }

        let record_id = record.id;
        self.store.insert_record(&record).await?;
        tracing::debug!(
            "Stored offline record {record_id} ({}) for device {device_id}",
            record.record_type
        );

        if self.probe.is_online().await {
            let _ = self.queue_tx.send(record_id);
        }

        Ok(record_id)
    }

    /// Sync all pending records, oldest first.
    ///
    /// Returns [`SyncReport::offline`] when the remote is unreachable so
    /// callers can tell "offline" apart from "ran and found nothing".
    pub async fn sync_when_online(&self) -> Result<SyncReport> {
        if !self.probe.is_online().await {
            tracing::info!("Sync skipped: remote service unreachable");
            return Ok(SyncReport::offline());
        }

        let _guard = self.drain_lock.lock().await;

        // The pending query below covers anything sitting in the queue
        {
            let mut queue = self.queue_rx.lock().await;
            while queue.try_recv().is_ok() {}
        }

        let pending = self.store.list_pending(None).await?;
        self.run_cycle(pending).await
    }

    /// Drain the background queue (scheduler entry point).
    pub(crate) async fn drain_queue(&self) -> Result<SyncReport> {
        if !self.probe.is_online().await {
            return Ok(SyncReport::offline());
        }

        let _guard = self.drain_lock.lock().await;

        let queued: Vec<RecordId> = {
            let mut queue = self.queue_rx.lock().await;
            let mut ids = Vec::new();
            while let Ok(id) = queue.try_recv() {
                ids.push(id);
            }
            ids
        };

        let mut records = Vec::new();
        for id in queued {
            if let Some(record) = self.store.get_record(&id).await? {
                if record.sync_status == SyncStatus::Pending {
                    records.push(record);
                }
            }
        }
        records.sort_by_key(|record| record.timestamp);

        self.run_cycle(records).await
    }

    /// Process one claimed batch; one record's failure never aborts the rest.
    async fn run_cycle(&self, records: Vec<OfflineRecord>) -> Result<SyncReport> {
        let mut report = SyncReport::completed();
        let mut device_failures: HashMap<String, u64> = HashMap::new();

        for record in &records {
            let Some(detail) = self.sync_one(record).await? else {
                // Claimed elsewhere; not ours to count
                continue;
            };

            report.total_records += 1;
            match detail.outcome.as_str() {
                "synced" => report.synced += 1,
                "conflict" => report.conflicts += 1,
                _ => {
                    report.failures += 1;
                    *device_failures.entry(record.device_id.clone()).or_default() += 1;
                }
            }
            report.details.push(detail);

            device_failures.entry(record.device_id.clone()).or_default();
        }

        for (device_id, failures) in device_failures {
            let pending = self.store.count_pending(&device_id).await?;
            self.store
                .record_device_cycle(&device_id, NetworkStatus::Online, pending, failures)
                .await?;
        }

        if report.total_records > 0 {
            tracing::info!(
                "Sync cycle finished: {}/{} synced, {} conflicts, {} failures",
                report.synced,
                report.total_records,
                report.conflicts,
                report.failures
            );
        }

        Ok(report)
    }

    /// Sync a single record, claiming it first.
    ///
    /// Returns `None` when the record was not claimable (already synced or
    /// claimed by a concurrent drain).
    pub async fn sync_one(&self, record: &OfflineRecord) -> Result<Option<SyncDetail>> {
        if !self.store.claim_for_sync(&record.id).await? {
            return Ok(None);
        }

        // Causal ordering: a child never syncs before its parent
        if let Some(parent_id) = record.parent_record_id {
            let parent_synced = matches!(
                self.store.get_record(&parent_id).await?,
                Some(parent) if parent.sync_status == SyncStatus::Synced
            );
            if !parent_synced {
                self.store.release_claim(&record.id).await?;
                let error = Error::DependencyNotSynced {
                    record: record.id.to_string(),
                    parent: parent_id.to_string(),
                };
                tracing::debug!("{error}; will retry next cycle");
                return Ok(Some(SyncDetail::new(
                    record,
                    "deferred",
                    Some(error.to_string()),
                )));
            }
        }

        match self.dispatch(record).await {
            Ok(StrategyOutcome::Synced) => {
                self.store.mark_synced(&record.id).await?;
                Ok(Some(SyncDetail::new(record, "synced", None)))
            }
            Ok(StrategyOutcome::Conflict {
                remote_data,
                changed_fields,
            }) => {
                self.record_conflict(record, remote_data, &changed_fields)
                    .await?;
                Ok(Some(SyncDetail::new(record, "conflict", None)))
            }
            Err(error) => {
                let status = self
                    .store
                    .mark_sync_failed(&record.id, self.config.max_sync_retries)
                    .await?;
                if status == SyncStatus::Failed {
                    tracing::warn!(
                        "Record {} failed permanently after {} attempts: {error}",
                        record.id,
                        self.config.max_sync_retries
                    );
                } else {
                    tracing::debug!("Record {} sync attempt failed: {error}", record.id);
                }
                Ok(Some(SyncDetail::new(
                    record,
                    "failed",
                    Some(error.to_string()),
                )))
            }
        }
    }

    /// Dispatch a record to its type-specific strategy.
    async fn dispatch(&self, record: &OfflineRecord) -> Result<StrategyOutcome> {
        match &record.record_type {
            RecordType::Inspection => self.sync_tracked_entity(record, "inspection_id").await,
            RecordType::Defect => self.sync_tracked_entity(record, "defect_id").await,
            // Field observations and media metadata never conflict-check:
            // the capture is authoritative and the payload is create-only
            RecordType::Measurement | RecordType::Photo | RecordType::Voice => {
                self.sync_create(record).await
            }
            // Forward-compatible default for unrecognized types
            RecordType::Other(_) => self.sync_create(record).await,
        }
    }

    /// Sync strategy for entities with a tracked remote counterpart.
    ///
    /// An update whose payload references a remote-format ID is checked for
    /// divergence before being applied; everything else is a plain create.
    async fn sync_tracked_entity(
        &self,
        record: &OfflineRecord,
        id_field: &str,
    ) -> Result<StrategyOutcome> {
        if record.operation == Operation::Update {
            if let Some(remote_id) = remote_reference(&record.data, id_field) {
                if let Some(remote_data) =
                    self.remote.fetch(&record.record_type, &remote_id).await?
                {
                    let changed_fields = changed_conflict_fields(&record.data, &remote_data);
                    if remote_modified_after(&record.data, &remote_data)
                        && !changed_fields.is_empty()
                    {
                        return Ok(StrategyOutcome::Conflict {
                            remote_data,
                            changed_fields,
                        });
                    }

                    self.remote.update(&remote_id, record).await?;
                    return Ok(StrategyOutcome::Synced);
                }
            }
        }

        self.remote.create(record).await?;
        Ok(StrategyOutcome::Synced)
    }

    async fn sync_create(&self, record: &OfflineRecord) -> Result<StrategyOutcome> {
        self.remote.create(record).await?;
        Ok(StrategyOutcome::Synced)
    }

    /// Store a conflict for the record and auto-apply the policy strategy.
    async fn record_conflict(
        &self,
        record: &OfflineRecord,
        remote_data: Value,
        changed_fields: &[String],
    ) -> Result<ConflictId> {
        let strategy = resolver::determine_strategy(&record.data, &remote_data, changed_fields);
        let conflict = SyncConflict::new(record.id, remote_data, ConflictType::Data, strategy);
        let conflict_id = conflict.id;

        let inserted = self.store.insert_conflict_if_absent(&conflict).await?;
        self.store.mark_conflict(&record.id).await?;

        if !inserted {
            // Never duplicate a conflict for the same record pair
            let existing = self.store.unresolved_conflict_for(&record.id).await?;
            return Ok(existing.map_or(conflict_id, |conflict| conflict.id));
        }

        tracing::info!(
            "Conflict detected on record {} ({} fields changed), strategy {strategy}",
            record.id,
            changed_fields.len()
        );

        if strategy != ResolutionStrategy::Manual {
            self.apply_resolution(conflict_id, strategy, "auto").await?;
        }

        Ok(conflict_id)
    }

    /// Resolve a conflict with an explicit, operator-chosen strategy.
    pub async fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        strategy: ResolutionStrategy,
    ) -> Result<()> {
        self.apply_resolution(conflict_id, strategy, "operator")
            .await
    }

    /// Apply a resolution strategy; applying twice is a no-op.
    async fn apply_resolution(
        &self,
        conflict_id: ConflictId,
        strategy: ResolutionStrategy,
        resolved_by: &str,
    ) -> Result<()> {
        let conflict = self
            .store
            .get_conflict(&conflict_id)
            .await?
            .ok_or_else(|| Error::NotFound(conflict_id.to_string()))?;
        if conflict.resolved_at.is_some() {
            return Ok(());
        }

        let record_id = conflict.local_record_id;
        let record = self
            .store
            .get_record(&record_id)
            .await?
            .ok_or_else(|| Error::NotFound(record_id.to_string()))?;

        match strategy {
            ResolutionStrategy::LocalWins => {
                // Local data stands; re-queue the push
                self.store.mark_pending(&record_id).await?;
            }
            ResolutionStrategy::RemoteWins => {
                let checksum = checksum::record_checksum(&conflict.remote_data);
                self.store
                    .update_record_data(&record_id, &conflict.remote_data, &checksum)
                    .await?;
                self.store.mark_synced(&record_id).await?;
            }
            ResolutionStrategy::Merge => {
                let merged = resolver::merge_payloads(&record.data, &conflict.remote_data);
                let checksum = checksum::record_checksum(&merged);
                self.store
                    .update_record_data(&record_id, &merged, &checksum)
                    .await?;
                self.store.mark_pending(&record_id).await?;
            }
            ResolutionStrategy::Manual => {
                return Err(Error::InvalidInput(
                    "manual resolution requires choosing a concrete strategy".to_string(),
                ));
            }
        }

        self.store
            .mark_conflict_resolved(&conflict_id, strategy, resolved_by)
            .await?;
        tracing::info!("Conflict {conflict_id} resolved via {strategy} by {resolved_by}");
        Ok(())
    }

    /// Current offline status for a device.
    pub async fn get_offline_status(&self, device_id: &str) -> Result<OfflineStatus> {
        let network_status = if self.probe.is_online().await {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        };

        let pending_records = self.store.count_pending(device_id).await?;
        let unresolved_conflicts = self.store.count_unresolved_conflicts().await?;
        let last_sync = self
            .store
            .get_device_state(device_id)
            .await?
            .and_then(|state| state.last_sync_timestamp);

        Ok(OfflineStatus {
            device_id: device_id.to_string(),
            network_status,
            pending_records,
            unresolved_conflicts,
            last_sync,
            can_work_offline: true,
        })
    }

    /// All conflicts still awaiting action.
    pub async fn list_unresolved_conflicts(&self) -> Result<Vec<SyncConflict>> {
        self.store.list_unresolved_conflicts().await
    }

    /// Re-queue records that exhausted their retries.
    pub async fn retry_failed_records(&self, device_id: Option<&str>) -> Result<usize> {
        let requeued = self.store.retry_failed(device_id).await?;
        if requeued > 0 {
            tracing::info!("Re-queued {requeued} failed records for sync");
        }
        Ok(requeued)
    }
}

/// Extract a remote-format entity reference from a payload field.
///
/// Local records are identified by UUIDs; anything else in the ID field is
/// a reference to a pre-existing server-side entity.
fn remote_reference(data: &Value, id_field: &str) -> Option<String> {
    let raw = data.get(id_field)?.as_str()?;
    if RecordId::from_str(raw).is_ok() {
        return None;
    }
    Some(raw.to_string())
}

/// Conflict-sensitive fields whose values differ between the two payloads.
fn changed_conflict_fields(local: &Value, remote: &Value) -> Vec<String> {
    CONFLICT_FIELDS
        .iter()
        .filter(|field| local.get(**field) != remote.get(**field))
        .map(ToString::to_string)
        .collect()
}

/// Whether the remote copy was modified after our local snapshot's base.
fn remote_modified_after(local: &Value, remote: &Value) -> bool {
    match (
        resolver::payload_timestamp(local),
        resolver::payload_timestamp(remote),
    ) {
        (Some(local_time), Some(remote_time)) => remote_time > local_time,
        _ => false,
    }
}
