// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Liveness heartbeat for a connected worker.
//!
//! The [`Heartbeat`] owns the timer only; what a beat writes is supplied by
//! the coordinator. Starting it again replaces the running timer, so a
//! reconnect never leaves two heartbeats scheduled.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use courier_config::model::HeartbeatConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::scheduler::WorkerScheduler;

pub struct Heartbeat {
    interval: Duration,
    running: Mutex<Option<CancellationToken>>,
}

impl Heartbeat {
    pub fn new(config: &HeartbeatConfig) -> Self {
        Self {
            interval: config.interval(),
            running: Mutex::new(None),
        }
    }

    /// Starts (or restarts) the timer on `scheduler`, calling `beat` every interval.
    pub fn start<F, Fut>(&self, scheduler: &WorkerScheduler, beat: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = scheduler.child_token();
        if let Some(previous) = self.slot().replace(token.clone()) {
            previous.cancel();
        }
        scheduler.spawn_interval(self.interval, token, beat);
        info!(interval_ms = self.interval.as_millis() as u64, "heartbeat started");
    }

    /// Stops the timer. Safe to call when it is not running.
    pub fn stop(&self) {
        if let Some(token) = self.slot().take() {
            token.cancel();
            info!("heartbeat stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot().as_ref().is_some_and(|t| !t.is_cancelled())
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
