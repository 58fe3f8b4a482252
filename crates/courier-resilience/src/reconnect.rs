// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff around a reconnect action.
//!
//! [`ReconnectManager::start`] spawns one backoff sequence: wait, run the
//! action, and on failure grow the delay by the multiplier up to the cap. After
//! `max_attempts` failures the exhaustion callback runs once and the manager
//! refuses to start again until [`ReconnectManager::reset`] or
//! [`ReconnectManager::stop`]. [`ReconnectManager::halt`] stops the manager
//! after a fatal fault; only `reset` lifts it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use courier_config::model::ReconnectConfig;
use courier_core::CourierError;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::scope::TaskScope;

/// The action retried by the manager, usually re-initializing the transport.
pub type ReconnectAction = Arc<dyn Fn() -> BoxFuture<'static, Result<(), CourierError>> + Send + Sync>;

/// Invoked once when every attempt has failed.
pub type ExhaustedCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Observability view of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectStatus {
    pub in_progress: bool,
    pub attempt_count: u32,
    pub next_delay: Duration,
    pub exhausted: bool,
    /// Set by [`ReconnectManager::halt`] until the next `reset`.
    pub halted: bool,
}

#[derive(Debug)]
struct BackoffState {
    attempt_count: u32,
    current_delay: Duration,
    in_progress: bool,
    exhausted: bool,
    halted: bool,
    /// Bumped on every start/stop so a superseded sequence exits quietly.
    generation: u64,
    cancel: Option<CancellationToken>,
}

#[derive(Clone)]
struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    max_attempts: u32,
}

impl Backoff {
    fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_delay)
    }
}

/// Per-worker reconnect scheduler.
pub struct ReconnectManager {
    backoff: Backoff,
    state: Arc<Mutex<BackoffState>>,
    action: ReconnectAction,
    on_exhausted: ExhaustedCallback,
    scope: TaskScope,
}

impl ReconnectManager {
    /// Sequences run inside `scope`; closing it stops them.
    pub fn new(
        config: &ReconnectConfig,
        action: ReconnectAction,
        on_exhausted: ExhaustedCallback,
        scope: TaskScope,
    ) -> Self {
        let backoff = Backoff {
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            multiplier: config.backoff_multiplier,
            max_attempts: config.max_attempts,
        };
        let state = BackoffState {
            attempt_count: 0,
            current_delay: backoff.initial_delay,
            in_progress: false,
            exhausted: false,
            halted: false,
            generation: 0,
            cancel: None,
        };
        Self {
            backoff,
            state: Arc::new(Mutex::new(state)),
            action,
            on_exhausted,
            scope,
        }
    }

    /// Begins a backoff sequence. No-op while one is running, after
    /// exhaustion, or while halted.
    pub fn start(&self) {
        let mut state = lock(&self.state);
        if state.halted {
            warn!("reconnect halted after a fatal fault, not starting");
            return;
        }
        if state.in_progress {
            debug!("reconnect already in progress");
            return;
        }
        if state.exhausted {
            warn!("reconnect attempts exhausted, not restarting");
            return;
        }

        state.in_progress = true;
        state.generation += 1;
        let token = self.scope.child_token();
        state.cancel = Some(token.clone());

        self.scope.spawn_tracked(run_sequence(
            Arc::clone(&self.state),
            self.backoff.clone(),
            Arc::clone(&self.action),
            Arc::clone(&self.on_exhausted),
            state.generation,
            token,
        ));
    }

    /// Cancels any pending attempt and restores the initial attempt/delay state.
    /// Never fires the exhaustion callback and does not lift a halt.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        self.cancel_sequence(&mut state);
    }

    /// Stops and refuses every later `start` until [`ReconnectManager::reset`].
    /// Used when the session failed in a way retrying cannot fix.
    pub fn halt(&self) {
        let mut state = lock(&self.state);
        self.cancel_sequence(&mut state);
        state.halted = true;
        info!("reconnect halted");
    }

    /// Success path: the connection is confirmed live, backoff is no longer needed.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        self.cancel_sequence(&mut state);
        state.halted = false;
        debug!("reconnect state reset");
    }

    fn cancel_sequence(&self, state: &mut BackoffState) {
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        state.generation += 1;
        state.in_progress = false;
        state.exhausted = false;
        state.attempt_count = 0;
        state.current_delay = self.backoff.initial_delay;
    }

    pub fn status(&self) -> ReconnectStatus {
        let state = lock(&self.state);
        ReconnectStatus {
            in_progress: state.in_progress,
            attempt_count: state.attempt_count,
            next_delay: state.current_delay,
            exhausted: state.exhausted,
            halted: state.halted,
        }
    }
}

fn lock(state: &Mutex<BackoffState>) -> MutexGuard<'_, BackoffState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Step {
    Attempt { attempt: u32, delay: Duration },
    Exhausted,
    Superseded,
}

async fn run_sequence(
    state: Arc<Mutex<BackoffState>>,
    backoff: Backoff,
    action: ReconnectAction,
    on_exhausted: ExhaustedCallback,
    generation: u64,
    token: CancellationToken,
) {
    loop {
        let step = {
            let mut s = lock(&state);
            if s.generation != generation {
                Step::Superseded
            } else if s.attempt_count >= backoff.max_attempts {
                s.in_progress = false;
                s.exhausted = true;
                s.cancel = None;
                Step::Exhausted
            } else {
                s.attempt_count += 1;
                Step::Attempt {
                    attempt: s.attempt_count,
                    delay: s.current_delay,
                }
            }
        };

        let (attempt, delay) = match step {
            Step::Superseded => return,
            Step::Exhausted => {
                error!(max_attempts = backoff.max_attempts, "max reconnect attempts reached");
                on_exhausted().await;
                return;
            }
            Step::Attempt { attempt, delay } => (attempt, delay),
        };

        info!(
            attempt,
            max_attempts = backoff.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect attempt"
        );

        tokio::select! {
            _ = token.cancelled() => {
                release_cancelled(&state, generation);
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let result = tokio::select! {
            _ = token.cancelled() => {
                release_cancelled(&state, generation);
                return;
            }
            result = action() => result,
        };

        let mut s = lock(&state);
        if s.generation != generation {
            return;
        }
        match result {
            Ok(()) => {
                s.in_progress = false;
                s.cancel = None;
                info!(attempt, "reconnect attempt succeeded");
                return;
            }
            Err(e) => {
                s.current_delay = backoff.next_delay(s.current_delay);
                warn!(attempt, error = %e, "reconnect attempt failed");
            }
        }
    }
}

/// A sequence cancelled through the parent token leaves the manager idle.
fn release_cancelled(state: &Mutex<BackoffState>, generation: u64) {
    let mut s = lock(state);
    if s.generation == generation {
        s.in_progress = false;
        s.cancel = None;
        debug!("reconnect sequence cancelled");
    }
}
