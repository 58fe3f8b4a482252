// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent store shared by workers and the supervisor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CourierError;
use crate::lifecycle::TransitionWrite;
use crate::types::{
    MessageLogEntry, SessionUpdate, TenantId, TenantSnapshot, TenantStatus, WorkerUpdate,
};

/// Row-level access to tenant, worker process, and messaging session records.
///
/// Each method is an atomic update of one row; the store gives last-writer-wins
/// semantics per row. One worker owns one tenant, so concurrent writers to the
/// same tenant are not expected.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Sets the tenant status column.
    async fn update_tenant_status(
        &self,
        tenant: &TenantId,
        status: TenantStatus,
    ) -> Result<(), CourierError>;

    /// Applies a partial update to the tenant's worker process row.
    async fn update_worker(
        &self,
        tenant: &TenantId,
        update: WorkerUpdate,
    ) -> Result<(), CourierError>;

    /// Applies a partial update to the tenant's messaging session row.
    async fn update_session(
        &self,
        tenant: &TenantId,
        update: SessionUpdate,
    ) -> Result<(), CourierError>;

    /// Appends an entry to the message log.
    async fn append_message(&self, entry: MessageLogEntry) -> Result<(), CourierError>;

    /// Moves the tenant's approved setup record (at most one) to active.
    ///
    /// Returns the id of the record that was activated, if there was one.
    async fn activate_approved_setup(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<String>, CourierError>;

    /// Workers believed running whose session was last seen before `cutoff`.
    async fn find_stale_workers(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TenantSnapshot>, CourierError>;

    /// Reads the current tenant / worker / session view.
    async fn snapshot(&self, tenant: &TenantId) -> Result<Option<TenantSnapshot>, CourierError>;

    /// Writes a lifecycle transition: session row, then tenant, then worker.
    ///
    /// Stops at the first failing write.
    async fn apply_transition(
        &self,
        tenant: &TenantId,
        write: TransitionWrite,
    ) -> Result<(), CourierError> {
        if !write.session.is_empty() {
            self.update_session(tenant, write.session).await?;
        }
        if let Some(status) = write.tenant {
            self.update_tenant_status(tenant, status).await?;
        }
        if !write.worker.is_empty() {
            self.update_worker(tenant, write.worker).await?;
        }
        Ok(())
    }
}
