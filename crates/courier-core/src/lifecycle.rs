// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant / worker / session state machine.
//!
//! The three externally visible dimensions move together through
//! [`LifecycleState::apply`]. Each [`LifecycleEvent`] is one edge of the
//! transition table; an event whose precondition does not hold is rejected
//! with [`CourierError::InvalidTransition`] instead of silently producing a
//! mixed state. The only edges that skip states are the force-to-error ones
//! ([`LifecycleEvent::StaleSweep`], [`LifecycleEvent::Fault`] and
//! [`LifecycleEvent::ReconnectExhausted`]).

use std::fmt;

use strum::Display;

use crate::error::CourierError;
use crate::types::{SessionState, SessionUpdate, TenantStatus, WorkerStatus, WorkerUpdate};

/// A trigger in the lifecycle transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleEvent {
    /// Admin surface started the worker process.
    WorkerStarted,
    /// Admin surface stopped the worker process.
    WorkerStopped,
    /// The worker asked the transport to (re)initialize the session.
    ConnectAttempt,
    /// The transport issued a pairing code.
    PairingCodeIssued,
    /// The transport reports the session is live.
    ConnectionEstablished,
    /// Periodic liveness tick from a connected worker.
    HeartbeatTick,
    /// The transport dropped the session.
    ConnectionLost,
    /// The reconnect backoff ran out of attempts.
    ReconnectExhausted,
    /// Unrecoverable pairing, authentication or startup failure.
    Fault,
    /// The supervisor saw no heartbeat within the stale threshold.
    StaleSweep,
}

/// The committed tenant / worker / session triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LifecycleState {
    tenant: TenantStatus,
    worker: WorkerStatus,
    session: SessionState,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tenant={} worker={} session={}",
            self.tenant, self.worker, self.session
        )
    }
}

impl LifecycleState {
    /// All three dimensions at their "not yet connected" values.
    pub fn initial() -> Self {
        Self {
            tenant: TenantStatus::New,
            worker: WorkerStatus::Stopped,
            session: SessionState::Disconnected,
        }
    }

    /// Rebuilds a state from stored columns. The result may be inconsistent;
    /// check with [`LifecycleState::inconsistency`].
    pub fn from_parts(tenant: TenantStatus, worker: WorkerStatus, session: SessionState) -> Self {
        Self {
            tenant,
            worker,
            session,
        }
    }

    pub fn tenant(&self) -> TenantStatus {
        self.tenant
    }

    pub fn worker(&self) -> WorkerStatus {
        self.worker
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn is_connected(&self) -> bool {
        self.session == SessionState::Connected
    }

    /// Applies one edge of the transition table, returning the next state.
    pub fn apply(&self, event: LifecycleEvent) -> Result<LifecycleState, CourierError> {
        let mut next = *self;
        match event {
            LifecycleEvent::WorkerStarted => {
                if self.worker == WorkerStatus::Running {
                    return Err(self.reject(event));
                }
                next.worker = WorkerStatus::Running;
                next.tenant = TenantStatus::QrPending;
            }
            LifecycleEvent::WorkerStopped => {
                next.worker = WorkerStatus::Stopped;
                next.tenant = TenantStatus::Stopped;
                next.session = SessionState::Disconnected;
            }
            LifecycleEvent::ConnectAttempt => {
                if self.is_connected() {
                    return Err(self.reject(event));
                }
                next.session = SessionState::Connecting;
            }
            LifecycleEvent::PairingCodeIssued => {
                if self.is_connected() {
                    return Err(self.reject(event));
                }
                next.session = SessionState::QrReady;
            }
            LifecycleEvent::ConnectionEstablished => {
                next.session = SessionState::Connected;
                next.tenant = TenantStatus::Active;
                next.worker = WorkerStatus::Running;
            }
            LifecycleEvent::HeartbeatTick => {
                if !self.is_connected() {
                    return Err(self.reject(event));
                }
                next.worker = WorkerStatus::Running;
            }
            LifecycleEvent::ConnectionLost => {
                if !self.is_connected() {
                    return Err(self.reject(event));
                }
                next.session = SessionState::Disconnected;
                next.tenant = TenantStatus::Error;
            }
            LifecycleEvent::ReconnectExhausted | LifecycleEvent::Fault => {
                next.tenant = TenantStatus::Error;
                next.worker = WorkerStatus::Error;
            }
            LifecycleEvent::StaleSweep => {
                if self.worker != WorkerStatus::Running {
                    return Err(self.reject(event));
                }
                next.tenant = TenantStatus::Error;
                next.worker = WorkerStatus::Error;
            }
        }
        Ok(next)
    }

    /// Describes the first data-consistency rule this state breaks, if any.
    pub fn inconsistency(&self) -> Option<&'static str> {
        if self.session == SessionState::Connected && self.worker == WorkerStatus::Stopped {
            return Some("connected session with a stopped worker");
        }
        if self.tenant == TenantStatus::Active && self.worker != WorkerStatus::Running {
            return Some("active tenant without a running worker");
        }
        if self.tenant == TenantStatus::Active && self.session != SessionState::Connected {
            return Some("active tenant without a connected session");
        }
        if self.tenant == TenantStatus::Stopped && self.worker != WorkerStatus::Stopped {
            return Some("stopped tenant with a live worker");
        }
        None
    }

    pub fn is_consistent(&self) -> bool {
        self.inconsistency().is_none()
    }

    /// Store writes needed to move from `self` to `next`, one per changed dimension.
    pub fn writes_to(&self, next: &LifecycleState) -> TransitionWrite {
        TransitionWrite {
            tenant: (self.tenant != next.tenant).then_some(next.tenant),
            worker: WorkerUpdate {
                status: (self.worker != next.worker).then_some(next.worker),
                last_error: None,
            },
            session: SessionUpdate {
                state: (self.session != next.session).then_some(next.session),
                ..SessionUpdate::default()
            },
        }
    }

    fn reject(&self, event: LifecycleEvent) -> CourierError {
        CourierError::InvalidTransition { from: *self, event }
    }
}

/// The row updates that commit a lifecycle transition to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionWrite {
    pub tenant: Option<TenantStatus>,
    pub worker: WorkerUpdate,
    pub session: SessionUpdate,
}

impl TransitionWrite {
    pub fn is_empty(&self) -> bool {
        self.tenant.is_none() && self.worker.is_empty() && self.session.is_empty()
    }

    /// Forces the worker status column to be written even if unchanged.
    pub fn with_worker_status(mut self, status: WorkerStatus) -> Self {
        self.worker.status = Some(status);
        self
    }

    pub fn with_last_error(mut self, last_error: Option<String>) -> Self {
        self.worker.last_error = Some(last_error);
        self
    }

    pub fn with_last_qr(mut self, last_qr: Option<String>) -> Self {
        self.session.last_qr = Some(last_qr);
        self
    }

    pub fn with_last_seen(mut self, at: chrono::DateTime<chrono::Utc>) -> Self {
        self.session.last_seen_at = Some(at);
        self
    }
}
