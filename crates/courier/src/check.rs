// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier check` command implementation.
//!
//! Loads the effective configuration and reports on the settings that most
//! often cause trouble in production: tenant identity, heartbeat margin
//! against the supervisor's stale threshold, and the reconnect budget.

use std::io::IsTerminal;
use std::time::Duration;

use courier_config::model::{CourierConfig, ReconnectConfig};

/// Status of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub message: String,
}

impl CheckResult {
    fn new(name: &'static str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name,
            status,
            message: message.into(),
        }
    }
}

/// Runs every check against an already validated configuration.
///
/// With `worker` set the configuration must be able to start a tenant worker.
pub fn run_checks(config: &CourierConfig, worker: bool) -> Vec<CheckResult> {
    vec![
        check_tenant(config, worker),
        check_heartbeat_margin(config),
        check_reconnect_budget(&config.reconnect),
        check_rate_limit(config),
    ]
}

fn check_tenant(config: &CourierConfig, worker: bool) -> CheckResult {
    match &config.worker.tenant_id {
        Some(id) => CheckResult::new("Tenant", CheckStatus::Pass, id.clone()),
        None if worker => CheckResult::new(
            "Tenant",
            CheckStatus::Fail,
            "worker.tenant_id is required to run a worker",
        ),
        None => CheckResult::new(
            "Tenant",
            CheckStatus::Warn,
            "worker.tenant_id not set (supervisor only)",
        ),
    }
}

/// A worker should survive one missed heartbeat without being marked stale.
fn check_heartbeat_margin(config: &CourierConfig) -> CheckResult {
    let beat = config.heartbeat.interval();
    let threshold = config.supervisor.stale_threshold();
    let message = format!(
        "every {}s, stale after {}s",
        beat.as_secs_f64(),
        threshold.as_secs()
    );
    if beat * 2 > threshold {
        CheckResult::new(
            "Heartbeat",
            CheckStatus::Warn,
            format!("{message}; one missed beat marks the worker stale"),
        )
    } else {
        CheckResult::new("Heartbeat", CheckStatus::Pass, message)
    }
}

fn check_reconnect_budget(config: &ReconnectConfig) -> CheckResult {
    let budget = reconnect_budget(config);
    CheckResult::new(
        "Reconnect",
        CheckStatus::Pass,
        format!(
            "{} attempts, gives up after {}",
            config.max_attempts,
            human_duration(budget)
        ),
    )
}

fn check_rate_limit(config: &CourierConfig) -> CheckResult {
    CheckResult::new(
        "Rate limit",
        CheckStatus::Pass,
        format!(
            "{} replies per {}s",
            config.rate_limit.max_requests,
            config.rate_limit.window().as_secs_f64()
        ),
    )
}

/// Total time spent waiting across a full, unsuccessful reconnect sequence.
pub fn reconnect_budget(config: &ReconnectConfig) -> Duration {
    let max = config.max_delay_ms as f64;
    let mut delay = config.initial_delay_ms as f64;
    let mut total = 0.0;
    for _ in 0..config.max_attempts {
        total += delay;
        delay = (delay * config.backoff_multiplier).min(max);
    }
    Duration::from_millis(total as u64)
}

fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}

/// Prints the report. Returns the number of failed checks.
pub fn print_report(results: &[CheckResult], plain: bool) -> usize {
    use colored::Colorize;

    let use_color = !plain && std::io::stdout().is_terminal();
    println!();
    println!("  courier check");
    println!("  {}", "-".repeat(50));

    let mut fail_count = 0;
    let mut warn_count = 0;
    for result in results {
        let (tag, symbol) = match result.status {
            CheckStatus::Pass => ("[OK]  ", "✓".green()),
            CheckStatus::Warn => {
                warn_count += 1;
                ("[WARN]", "!".yellow())
            }
            CheckStatus::Fail => {
                fail_count += 1;
                ("[FAIL]", "✗".red())
            }
        };
        if use_color {
            println!("    {symbol} {:<12} {}", result.name, result.message);
        } else {
            println!("    {tag} {:<12} {}", result.name, result.message);
        }
    }

    println!();
    match fail_count + warn_count {
        0 => println!("  All checks passed."),
        1 => println!("  1 issue found."),
        n => println!("  {n} issues found."),
    }
    println!();

    fail_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_budget_is_capped_per_attempt() {
        // 5 + 15 + 45 + 135 seconds, then six attempts at the five minute cap.
        let budget = reconnect_budget(&ReconnectConfig::default());
        assert_eq!(budget, Duration::from_secs(200 + 6 * 300));
        assert_eq!(human_duration(budget), "36m 40s");
    }

    #[test]
    fn missing_tenant_is_a_warning() {
        let results = run_checks(&CourierConfig::default(), false);
        let tenant = results.iter().find(|r| r.name == "Tenant").unwrap();
        assert_eq!(tenant.status, CheckStatus::Warn);
        assert!(results.iter().all(|r| r.status != CheckStatus::Fail));
    }

    #[test]
    fn worker_mode_requires_a_tenant() {
        let mut config = CourierConfig::default();
        let results = run_checks(&config, true);
        assert_eq!(results[0].status, CheckStatus::Fail);

        config.worker.tenant_id = Some("tenant-1".to_string());
        let results = run_checks(&config, true);
        assert_eq!(results[0].status, CheckStatus::Pass);
        assert_eq!(results[0].message, "tenant-1");
    }

    #[test]
    fn tight_heartbeat_margin_is_flagged() {
        let mut config = CourierConfig::default();
        config.heartbeat.interval_ms = 90_000;
        let result = check_heartbeat_margin(&config);
        assert_eq!(result.status, CheckStatus::Warn);

        config.heartbeat.interval_ms = 30_000;
        assert_eq!(check_heartbeat_margin(&config).status, CheckStatus::Pass);
    }

    #[test]
    fn durations_read_naturally() {
        assert_eq!(human_duration(Duration::from_secs(42)), "42s");
        assert_eq!(human_duration(Duration::from_secs(3 * 3600 + 120)), "3h 2m");
    }
}
