// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped task scheduler owned by one worker.
//!
//! Every timer and background task of a worker is spawned here so the whole
//! set can be cancelled and awaited in one step on shutdown.

use std::future::Future;
use std::time::Duration;

use courier_resilience::TaskScope;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct WorkerScheduler {
    scope: TaskScope,
}

impl WorkerScheduler {
    /// Creates a scheduler whose tasks also stop when `parent` is cancelled.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            scope: TaskScope::new(parent),
        }
    }

    /// The task set shared with the worker's queues and reconnect manager.
    pub fn scope(&self) -> &TaskScope {
        &self.scope
    }

    /// Token cancelled when the scheduler shuts down.
    pub fn token(&self) -> CancellationToken {
        self.scope.token()
    }

    /// A token for a task that must be stoppable on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.scope.child_token()
    }

    pub fn is_shut_down(&self) -> bool {
        self.scope.is_closed()
    }

    /// Runs `task` until it finishes or the scheduler shuts down.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.scope.spawn(task);
    }

    /// Calls `tick` every `period` (first call after one period) until `token`
    /// is cancelled. A tick that overruns delays the following ones.
    pub fn spawn_interval<F, Fut>(&self, period: Duration, token: CancellationToken, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.scope.spawn_tracked(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }
        });
    }

    /// Cancels every task and waits for them to finish.
    pub async fn shutdown(&self) {
        self.scope.close().await;
        debug!("worker scheduler shut down");
    }
}
