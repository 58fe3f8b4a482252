// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-window outbound rate limiter.
//!
//! A window opens on the first call for a tenant and admits `max_requests`
//! calls. When it is older than `window` the next call starts a fresh window
//! with the counter and warning flag cleared. Only the first denial in a window
//! reports `warning_already_sent = false`.

use std::collections::HashMap;
use std::time::Duration;

use courier_config::model::RateLimitConfig;
use courier_core::TenantId;
use tokio::time::Instant;
use tracing::{debug, info};

/// Outcome of a [`RateLimiter::check_limit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Set on every denial after the first in the same window.
    pub warning_already_sent: bool,
}

/// Observability view of a tenant's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
    pub count: u32,
    pub limit: u32,
    pub window: Duration,
    pub reset_in: Duration,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    window_start: Instant,
    warning_sent: bool,
}

impl RateWindow {
    fn open(now: Instant) -> Self {
        Self {
            count: 1,
            window_start: now,
            warning_sent: false,
        }
    }
}

/// Per-worker outbound reply limiter, keyed by tenant.
#[derive(Debug)]
pub struct RateLimiter {
    windows: HashMap<TenantId, RateWindow>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_limits(config.max_requests, config.window())
    }

    pub fn with_limits(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: HashMap::new(),
            max_requests,
            window,
        }
    }

    /// Counts one outbound reply for `tenant` and decides whether it may be sent.
    pub fn check_limit(&mut self, tenant: &TenantId) -> RateDecision {
        let now = Instant::now();
        let fresh = RateDecision {
            allowed: true,
            remaining: self.max_requests.saturating_sub(1),
            warning_already_sent: false,
        };

        let Some(entry) = self.windows.get_mut(tenant) else {
            self.windows.insert(tenant.clone(), RateWindow::open(now));
            return fresh;
        };

        if now.saturating_duration_since(entry.window_start) > self.window {
            *entry = RateWindow::open(now);
            return fresh;
        }

        if entry.count >= self.max_requests {
            let warning_already_sent = entry.warning_sent;
            if !warning_already_sent {
                entry.warning_sent = true;
                info!(tenant_id = %tenant, limit = self.max_requests, "rate limit exceeded");
            } else {
                debug!(tenant_id = %tenant, "rate limit still exceeded, notice suppressed");
            }
            return RateDecision {
                allowed: false,
                remaining: 0,
                warning_already_sent,
            };
        }

        entry.count += 1;
        RateDecision {
            allowed: true,
            remaining: self.max_requests - entry.count,
            warning_already_sent: false,
        }
    }

    pub fn status(&self, tenant: &TenantId) -> RateStatus {
        let (count, reset_in) = match self.windows.get(tenant) {
            Some(entry) => (
                entry.count,
                self.window
                    .saturating_sub(Instant::now().saturating_duration_since(entry.window_start)),
            ),
            None => (0, Duration::ZERO),
        };
        RateStatus {
            count,
            limit: self.max_requests,
            window: self.window,
            reset_in,
        }
    }

    /// Changes the limit and/or window in place. Open windows keep their
    /// counters and are judged against the new values from the next call on.
    pub fn update_config(&mut self, max_requests: Option<u32>, window: Option<Duration>) {
        if let Some(max_requests) = max_requests {
            self.max_requests = max_requests;
        }
        if let Some(window) = window {
            self.window = window;
        }
        info!(
            max_requests = self.max_requests,
            window_ms = self.window.as_millis() as u64,
            "rate limit reconfigured"
        );
    }
}
