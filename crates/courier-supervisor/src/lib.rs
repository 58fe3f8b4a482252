// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervisor side of the Courier worker lifecycle.
//!
//! The supervisor never talks to a worker directly. It reads and writes the
//! shared store: [`StaleWorkerDetector`] forces workers that stopped beating
//! into ERROR, and [`admin`] applies the start/stop edges the admin surface
//! triggers.

pub mod admin;
pub mod stale;

pub use admin::{apply_event, record_worker_started, record_worker_stopped};
pub use stale::{StaleWorkerDetector, SweepReport};
