// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle edges applied from outside the worker.

use courier_core::{
    CourierError, LifecycleEvent, LifecycleState, StateStore, TenantId, TransitionWrite,
};
use tracing::info;

/// Applies `event` to the tenant's stored lifecycle and writes the changed
/// dimensions plus `extras`. A tenant without rows starts from the initial state.
pub async fn apply_event(
    store: &dyn StateStore,
    tenant: &TenantId,
    event: LifecycleEvent,
    extras: impl FnOnce(TransitionWrite) -> TransitionWrite,
) -> Result<LifecycleState, CourierError> {
    let current = store
        .snapshot(tenant)
        .await?
        .map(|snapshot| snapshot.lifecycle())
        .unwrap_or_default();
    commit_from(store, tenant, current, event, extras).await
}

pub(crate) async fn commit_from(
    store: &dyn StateStore,
    tenant: &TenantId,
    current: LifecycleState,
    event: LifecycleEvent,
    extras: impl FnOnce(TransitionWrite) -> TransitionWrite,
) -> Result<LifecycleState, CourierError> {
    let next = current.apply(event)?;
    let write = extras(current.writes_to(&next));
    if !write.is_empty() {
        store.apply_transition(tenant, write).await?;
    }
    Ok(next)
}

/// The admin surface launched the tenant's worker process.
///
/// Worker goes RUNNING with its last error cleared and the tenant waits for pairing.
pub async fn record_worker_started(
    store: &dyn StateStore,
    tenant: &TenantId,
) -> Result<LifecycleState, CourierError> {
    let next = apply_event(store, tenant, LifecycleEvent::WorkerStarted, |w| {
        w.with_last_error(None)
    })
    .await?;
    info!(tenant_id = %tenant, state = %next, "worker started");
    Ok(next)
}

/// The admin surface stopped the tenant's worker process.
pub async fn record_worker_stopped(
    store: &dyn StateStore,
    tenant: &TenantId,
) -> Result<LifecycleState, CourierError> {
    let next = apply_event(store, tenant, LifecycleEvent::WorkerStopped, |w| w).await?;
    info!(tenant_id = %tenant, state = %next, "worker stopped");
    Ok(next)
}
