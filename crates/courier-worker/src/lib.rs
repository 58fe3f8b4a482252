// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant worker runtime for Courier.
//!
//! The [`WorkerLifecycleCoordinator`] is the central coordinator that:
//! - Receives events from the messaging transport
//! - Drops duplicates and serializes messages per chat
//! - Rate limits replies and sends control notices
//! - Commits tenant / worker / session transitions to the store
//! - Runs the heartbeat while connected and reconnects with backoff
//! - Handles graceful shutdown

pub mod coordinator;
pub mod heartbeat;
pub mod scheduler;
pub mod shutdown;

pub use coordinator::{
    InboundOutcome, MessageOutcome, WorkerDeps, WorkerLifecycleCoordinator, WorkerReport,
};
pub use heartbeat::Heartbeat;
pub use scheduler::WorkerScheduler;
pub use shutdown::install_signal_handler;
