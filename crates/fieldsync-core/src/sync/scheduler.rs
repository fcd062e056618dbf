//! Background sync scheduler.
//!
//! A single cooperative task owned by the engine's lifecycle: started via
//! [`crate::sync::SyncEngine::start_scheduler`], stopped via
//! [`SyncScheduler::shutdown`]. Never a detached daemon.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::SyncEngine;

/// Handle to the running background sync task.
pub struct SyncScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawn the drain loop for the given engine.
    pub(crate) fn spawn(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match engine.drain_queue().await {
                            Ok(report) if report.total_records > 0 => {
                                tracing::debug!(
                                    "Background drain: {}/{} synced",
                                    report.synced,
                                    report.total_records
                                );
                            }
                            Ok(_) => {}
                            Err(error) => {
                                tracing::error!("Background sync drain failed: {error}");
                            }
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Background sync scheduler stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop the scheduler and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::Result;
    use crate::models::{OfflineRecord, Operation, RecordType, SyncStatus};
    use crate::store::StoreService;
    use crate::sync::{ConnectivityProbe, RemoteRecord, SyncTarget};
    use serde_json::{json, Value};
    use std::sync::Mutex as StdMutex;

    struct AlwaysOnline;

    #[async_trait::async_trait]
    impl ConnectivityProbe for AlwaysOnline {
        async fn is_online(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct CountingTarget {
        accepted: StdMutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl SyncTarget for CountingTarget {
        async fn fetch(&self, _record_type: &RecordType, _remote_id: &str) -> Result<Option<Value>> {
            Ok(None)
        }

        async fn create(&self, record: &OfflineRecord) -> Result<Value> {
            self.accepted.lock().unwrap().push(record.id.as_str());
            Ok(json!({"status": "accepted"}))
        }

        async fn update(&self, _remote_id: &str, record: &OfflineRecord) -> Result<Value> {
            self.accepted.lock().unwrap().push(record.id.as_str());
            Ok(json!({"status": "updated"}))
        }

        async fn records_for_worker(&self, _worker_id: &str) -> Result<Vec<RemoteRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduler_drains_enqueued_records_and_shuts_down() {
        let store = StoreService::open_in_memory().await.unwrap();
        let target = Arc::new(CountingTarget::default());
        let config = EngineConfig::default().with_sync_interval(Duration::from_millis(20));
        let engine = SyncEngine::new(store, Arc::new(AlwaysOnline), target.clone(), config);

        let scheduler = engine.start_scheduler();

        let record_id = engine
            .store_offline_record(
                RecordType::Measurement,
                json!({"value": 1}),
                "W1",
                "D1",
                None,
                Operation::Create,
            )
            .await
            .unwrap();

        // Give the drain loop a few ticks
        let mut synced = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let record = engine.store().get_record(&record_id).await.unwrap().unwrap();
            if record.sync_status == SyncStatus::Synced {
                synced = true;
                break;
            }
        }
        assert!(synced, "scheduler never drained the queued record");
        assert_eq!(target.accepted.lock().unwrap().len(), 1);

        scheduler.shutdown().await;
    }
}
