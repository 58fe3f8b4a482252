// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `StateStore` for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use courier_core::{
    CourierError, MessageLogEntry, SessionUpdate, StateStore, TenantId, TenantSnapshot,
    TenantStatus, WorkerStatus, WorkerUpdate,
};

/// Status of a tenant setup record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStatus {
    Pending,
    Approved,
    Active,
}

#[derive(Debug, Clone)]
struct SetupRecord {
    id: String,
    tenant_id: TenantId,
    status: SetupStatus,
}

#[derive(Default)]
struct Tables {
    tenants: HashMap<TenantId, TenantSnapshot>,
    setups: Vec<SetupRecord>,
    messages: Vec<MessageLogEntry>,
}

impl Tables {
    fn tenant(&mut self, tenant: &TenantId) -> &mut TenantSnapshot {
        self.tenants
            .entry(tenant.clone())
            .or_insert_with(|| TenantSnapshot::new(tenant.clone()))
    }
}

/// Row store backed by hash maps. Rows are created on first write.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    failing_tenants: std::sync::Mutex<HashSet<TenantId>>,
    fail_message_log: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a tenant's rows.
    pub async fn insert_snapshot(&self, snapshot: TenantSnapshot) {
        self.tables
            .lock()
            .await
            .tenants
            .insert(snapshot.tenant_id.clone(), snapshot);
    }

    /// Seed a setup record for `tenant`.
    pub async fn add_setup(&self, tenant: &TenantId, id: &str, status: SetupStatus) {
        self.tables.lock().await.setups.push(SetupRecord {
            id: id.to_string(),
            tenant_id: tenant.clone(),
            status,
        });
    }

    pub async fn setup_status(&self, id: &str) -> Option<SetupStatus> {
        self.tables
            .lock()
            .await
            .setups
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.status)
    }

    pub async fn messages(&self) -> Vec<MessageLogEntry> {
        self.tables.lock().await.messages.clone()
    }

    /// Make every row write fail until turned off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make row writes for `tenant` alone fail until turned off again.
    pub fn set_fail_writes_for(&self, tenant: &TenantId, fail: bool) {
        let mut failing = self
            .failing_tenants
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if fail {
            failing.insert(tenant.clone());
        } else {
            failing.remove(tenant);
        }
    }

    /// Make message log appends fail until turned off again.
    pub fn set_fail_message_log(&self, fail: bool) {
        self.fail_message_log.store(fail, Ordering::SeqCst);
    }

    /// Number of row writes accepted so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_writable(&self, tenant: &TenantId) -> Result<(), CourierError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CourierError::store("memory store write failure"));
        }
        let locked = self
            .failing_tenants
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(tenant);
        if locked {
            return Err(CourierError::store(format!("row locked for tenant {tenant}")));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn update_tenant_status(
        &self,
        tenant: &TenantId,
        status: TenantStatus,
    ) -> Result<(), CourierError> {
        self.check_writable(tenant)?;
        self.tables.lock().await.tenant(tenant).tenant_status = status;
        Ok(())
    }

    async fn update_worker(
        &self,
        tenant: &TenantId,
        update: WorkerUpdate,
    ) -> Result<(), CourierError> {
        self.check_writable(tenant)?;
        let mut tables = self.tables.lock().await;
        let row = tables.tenant(tenant);
        if let Some(status) = update.status {
            row.worker_status = status;
        }
        if let Some(last_error) = update.last_error {
            row.last_error = last_error;
        }
        Ok(())
    }

    async fn update_session(
        &self,
        tenant: &TenantId,
        update: SessionUpdate,
    ) -> Result<(), CourierError> {
        self.check_writable(tenant)?;
        let mut tables = self.tables.lock().await;
        let row = tables.tenant(tenant);
        if let Some(state) = update.state {
            row.session_state = state;
        }
        if let Some(last_qr) = update.last_qr {
            row.last_qr = last_qr;
        }
        if let Some(at) = update.last_seen_at {
            row.last_seen_at = Some(at);
        }
        Ok(())
    }

    async fn append_message(&self, entry: MessageLogEntry) -> Result<(), CourierError> {
        if self.fail_message_log.load(Ordering::SeqCst) {
            return Err(CourierError::store("memory store message log failure"));
        }
        self.tables.lock().await.messages.push(entry);
        Ok(())
    }

    async fn activate_approved_setup(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<String>, CourierError> {
        self.check_writable(tenant)?;
        let mut tables = self.tables.lock().await;
        let approved = tables
            .setups
            .iter_mut()
            .find(|s| &s.tenant_id == tenant && s.status == SetupStatus::Approved);
        Ok(approved.map(|setup| {
            setup.status = SetupStatus::Active;
            setup.id.clone()
        }))
    }

    async fn find_stale_workers(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TenantSnapshot>, CourierError> {
        let tables = self.tables.lock().await;
        let mut stale: Vec<TenantSnapshot> = tables
            .tenants
            .values()
            .filter(|row| {
                row.worker_status == WorkerStatus::Running
                    && row.last_seen_at.is_some_and(|seen| seen < cutoff)
            })
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.tenant_id.0.cmp(&b.tenant_id.0));
        Ok(stale)
    }

    async fn snapshot(&self, tenant: &TenantId) -> Result<Option<TenantSnapshot>, CourierError> {
        Ok(self.tables.lock().await.tenants.get(tenant).cloned())
    }
}
