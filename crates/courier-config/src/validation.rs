// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-zero capacities, positive intervals, and ordered delay bounds.

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let mut require_positive = |key: &str, value: u64| {
        if value == 0 {
            errors.push(ConfigError::Validation {
                message: format!("{key} must be greater than zero"),
            });
        }
    };

    require_positive("queue.max_backlog", config.queue.max_backlog as u64);
    require_positive("dedup.ttl_ms", config.dedup.ttl_ms);
    require_positive("dedup.capacity", config.dedup.capacity as u64);
    require_positive("dedup.sweep_interval_ms", config.dedup.sweep_interval_ms);
    require_positive("rate_limit.max_requests", u64::from(config.rate_limit.max_requests));
    require_positive("rate_limit.window_ms", config.rate_limit.window_ms);
    require_positive("reconnect.initial_delay_ms", config.reconnect.initial_delay_ms);
    require_positive("reconnect.max_attempts", u64::from(config.reconnect.max_attempts));
    require_positive("heartbeat.interval_ms", config.heartbeat.interval_ms);
    require_positive(
        "supervisor.stale_threshold_secs",
        config.supervisor.stale_threshold_secs,
    );
    require_positive("supervisor.sweep_interval_ms", config.supervisor.sweep_interval_ms);

    let multiplier = config.reconnect.backoff_multiplier;
    if !multiplier.is_finite() || multiplier < 1.0 {
        errors.push(ConfigError::Validation {
            message: format!("reconnect.backoff_multiplier must be at least 1.0, got {multiplier}"),
        });
    }

    if config.reconnect.max_delay_ms < config.reconnect.initial_delay_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "reconnect.max_delay_ms ({}) must not be below reconnect.initial_delay_ms ({})",
                config.reconnect.max_delay_ms, config.reconnect.initial_delay_ms
            ),
        });
    }

    // A heartbeat slower than the stale threshold makes every live worker look dead.
    if config.heartbeat.interval_ms >= config.supervisor.stale_threshold_secs.saturating_mul(1000)
        && config.supervisor.stale_threshold_secs > 0
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "heartbeat.interval_ms ({}) must be shorter than supervisor.stale_threshold_secs ({}s)",
                config.heartbeat.interval_ms, config.supervisor.stale_threshold_secs
            ),
        });
    }

    if !LOG_LEVELS.contains(&config.worker.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "worker.log_level `{}` is not one of {}",
                config.worker.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if let Some(tenant_id) = &config.worker.tenant_id
        && tenant_id.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "worker.tenant_id must not be empty when set".to_string(),
        });
    }

    for (key, text) in [
        ("notices.queue_full", &config.notices.queue_full),
        ("notices.rate_limited", &config.notices.rate_limited),
    ] {
        if text.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("{key} must not be empty"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
