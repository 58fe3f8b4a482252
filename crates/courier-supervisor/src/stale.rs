// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic detection of workers that stopped sending heartbeats.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_config::model::SupervisorConfig;
use courier_core::{CourierError, LifecycleEvent, StateStore, TenantId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::admin::commit_from;

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Tenants moved to ERROR by this sweep.
    pub marked: Vec<TenantId>,
    /// Tenants whose write failed, with the store error. Retried next sweep.
    pub failed: Vec<(TenantId, String)>,
}

/// Marks RUNNING workers whose session has not been seen within the
/// threshold as ERROR, together with their tenant.
pub struct StaleWorkerDetector {
    store: Arc<dyn StateStore>,
    threshold: Duration,
    interval: Duration,
}

impl StaleWorkerDetector {
    pub fn new(store: Arc<dyn StateStore>, config: &SupervisorConfig) -> Self {
        Self {
            store,
            threshold: config.stale_threshold(),
            interval: config.sweep_interval(),
        }
    }

    /// Text written as the worker's last error.
    pub fn reason(&self) -> String {
        let secs = self.threshold.as_secs();
        if secs % 60 == 0 {
            format!("Worker marked STALE: No heartbeat for {}+ minutes", secs / 60)
        } else {
            format!("Worker marked STALE: No heartbeat for {secs}+ seconds")
        }
    }

    /// One sweep as of `now`. A tenant whose write fails is reported and
    /// the sweep moves on to the rest; only a failed lookup aborts it.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, CourierError> {
        let threshold = chrono::Duration::from_std(self.threshold)
            .map_err(|e| CourierError::Internal(format!("stale threshold out of range: {e}")))?;
        let stale = self.store.find_stale_workers(now - threshold).await?;

        let mut report = SweepReport::default();
        for snapshot in stale {
            warn!(
                tenant_id = %snapshot.tenant_id,
                last_seen = ?snapshot.last_seen_at,
                "marking stale worker as ERROR"
            );
            let reason = self.reason();
            match commit_from(
                self.store.as_ref(),
                &snapshot.tenant_id,
                snapshot.lifecycle(),
                LifecycleEvent::StaleSweep,
                |w| w.with_last_error(Some(reason)),
            )
            .await
            {
                Ok(_) => report.marked.push(snapshot.tenant_id),
                Err(e @ CourierError::InvalidTransition { .. }) => {
                    debug!(tenant_id = %snapshot.tenant_id, error = %e, "worker no longer running, skipped");
                }
                Err(e) => {
                    error!(tenant_id = %snapshot.tenant_id, error = %e, "failed to mark stale worker");
                    report.failed.push((snapshot.tenant_id, e.to_string()));
                }
            }
        }

        if !report.marked.is_empty() {
            info!(count = report.marked.len(), "marked stale workers as ERROR");
        }
        if !report.failed.is_empty() {
            warn!(count = report.failed.len(), "stale workers left unmarked, retrying next sweep");
        }
        Ok(report)
    }

    pub async fn sweep(&self) -> Result<SweepReport, CourierError> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweeps every interval until `cancel` fires. A failed sweep is retried
    /// on the next tick.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            threshold_secs = self.threshold.as_secs(),
            "starting stale worker checker"
        );
        let mut interval = tokio::time::interval(self.interval);
        // Skip the first immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "error marking stale workers");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("stale worker checker shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{
        SessionState, TenantSnapshot, TenantStatus, WorkerStatus,
    };
    use courier_test_utils::MemoryStore;

    fn running(id: &str, last_seen: Option<DateTime<Utc>>) -> TenantSnapshot {
        let mut snapshot = TenantSnapshot::new(TenantId::from(id));
        snapshot.tenant_status = TenantStatus::Active;
        snapshot.worker_status = WorkerStatus::Running;
        snapshot.session_state = SessionState::Connected;
        snapshot.last_seen_at = last_seen;
        snapshot
    }

    fn detector(store: Arc<MemoryStore>) -> StaleWorkerDetector {
        StaleWorkerDetector::new(store, &SupervisorConfig::default())
    }

    #[tokio::test]
    async fn marks_only_workers_past_the_threshold() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_snapshot(running("old", Some(now - chrono::Duration::minutes(5))))
            .await;
        store
            .insert_snapshot(running("fresh", Some(now - chrono::Duration::seconds(30))))
            .await;
        store.insert_snapshot(running("never-seen", None)).await;

        let report = detector(store.clone()).sweep_at(now).await.unwrap();
        assert_eq!(report.marked, vec![TenantId::from("old")]);
        assert!(report.failed.is_empty());

        let old = store.snapshot(&TenantId::from("old")).await.unwrap().unwrap();
        assert_eq!(old.worker_status, WorkerStatus::Error);
        assert_eq!(old.tenant_status, TenantStatus::Error);
        assert_eq!(
            old.last_error.as_deref(),
            Some("Worker marked STALE: No heartbeat for 2+ minutes")
        );
        assert_eq!(old.session_state, SessionState::Connected);

        let fresh = store.snapshot(&TenantId::from("fresh")).await.unwrap().unwrap();
        assert_eq!(fresh.worker_status, WorkerStatus::Running);
        assert_eq!(fresh.tenant_status, TenantStatus::Active);
    }

    #[tokio::test]
    async fn second_sweep_finds_nothing() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_snapshot(running("old", Some(now - chrono::Duration::minutes(10))))
            .await;
        let detector = detector(store);

        assert_eq!(detector.sweep_at(now).await.unwrap().marked.len(), 1);
        assert_eq!(detector.sweep_at(now).await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn one_unwritable_tenant_does_not_block_the_rest() {
        let now = Utc::now();
        let last_seen = Some(now - chrono::Duration::minutes(5));
        let store = Arc::new(MemoryStore::new());
        for id in ["a-locked", "b-stale", "c-stale"] {
            store.insert_snapshot(running(id, last_seen)).await;
        }
        store.set_fail_writes_for(&TenantId::from("a-locked"), true);
        let detector = detector(store.clone());

        for _ in 0..2 {
            let report = detector.sweep_at(now).await.unwrap();
            assert_eq!(report.failed.len(), 1);
            assert_eq!(report.failed[0].0, TenantId::from("a-locked"));
        }
        for id in ["b-stale", "c-stale"] {
            let row = store.snapshot(&TenantId::from(id)).await.unwrap().unwrap();
            assert_eq!(row.worker_status, WorkerStatus::Error);
        }
        let locked = store.snapshot(&TenantId::from("a-locked")).await.unwrap().unwrap();
        assert_eq!(locked.worker_status, WorkerStatus::Running);

        store.set_fail_writes_for(&TenantId::from("a-locked"), false);
        let report = detector.sweep_at(now).await.unwrap();
        assert_eq!(report.marked, vec![TenantId::from("a-locked")]);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn reason_falls_back_to_seconds() {
        let config = SupervisorConfig {
            stale_threshold_secs: 90,
            sweep_interval_ms: 1_000,
        };
        let detector = StaleWorkerDetector::new(Arc::new(MemoryStore::new()), &config);
        assert_eq!(
            detector.reason(),
            "Worker marked STALE: No heartbeat for 90+ seconds"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let detector = Arc::new(detector(store));
        let cancel = CancellationToken::new();

        let task = {
            let detector = detector.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { detector.run(cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        task.await.unwrap();
    }
}
