// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Courier workers and the supervisor.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Worker identity and logging.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Per-chat sequential queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Inbound message deduplication settings.
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Outbound reply rate limiting settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Reconnect backoff settings.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Worker heartbeat settings.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Supervisor stale-worker sweep settings.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Texts of the control notices sent to chat participants.
    #[serde(default)]
    pub notices: NoticeConfig,
}

/// Worker identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Tenant served by this worker. Required to run a worker, not the supervisor.
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tenant_id: None,
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-chat queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Maximum number of tasks waiting behind the running one, per chat.
    #[serde(default = "default_max_backlog")]
    pub max_backlog: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_backlog: default_max_backlog(),
        }
    }
}

fn default_max_backlog() -> usize {
    50
}

/// Deduplication cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DedupConfig {
    /// How long a seen message id stays a duplicate, in milliseconds.
    #[serde(default = "default_dedup_ttl_ms")]
    pub ttl_ms: u64,

    /// Maximum number of live entries.
    #[serde(default = "default_dedup_capacity")]
    pub capacity: usize,

    /// Interval of the periodic expiry sweep, in milliseconds.
    #[serde(default = "default_dedup_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl DedupConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_dedup_ttl_ms(),
            capacity: default_dedup_capacity(),
            sweep_interval_ms: default_dedup_sweep_interval_ms(),
        }
    }
}

fn default_dedup_ttl_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_dedup_capacity() -> usize {
    1000
}

fn default_dedup_sweep_interval_ms() -> u64 {
    60_000
}

/// Fixed-window rate limit for outbound replies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Replies allowed per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

fn default_max_requests() -> u32 {
    10
}

fn default_window_ms() -> u64 {
    60_000
}

/// Exponential backoff for transport reconnects.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Delay before the first attempt, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Factor applied to the delay after each failed attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on the delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Attempts before the terminal failure callback fires.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl ReconnectConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> f64 {
    3.0
}

fn default_max_delay_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_max_attempts() -> u32 {
    10
}

/// Worker heartbeat configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    /// Interval between liveness writes while connected, in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

/// Supervisor-side stale-worker detection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    /// A running worker whose session was last seen longer ago than this is stale.
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: u64,

    /// Interval between sweeps, in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl SupervisorConfig {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: default_stale_threshold_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

fn default_stale_threshold_secs() -> u64 {
    120 // 2 minutes
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

/// Control notices. These are sent directly and do not count against the rate limit.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NoticeConfig {
    /// Sent when a chat's queue is full and the message is dropped.
    #[serde(default = "default_queue_full_notice")]
    pub queue_full: String,

    /// Sent once per window when the tenant exceeds its reply rate.
    #[serde(default = "default_rate_limited_notice")]
    pub rate_limited: String,
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            queue_full: default_queue_full_notice(),
            rate_limited: default_rate_limited_notice(),
        }
    }
}

fn default_queue_full_notice() -> String {
    "Tafadhali subiri... / Please wait...".to_string()
}

fn default_rate_limited_notice() -> String {
    "Tafadhali pole pole... / Please slow down...".to_string()
}
