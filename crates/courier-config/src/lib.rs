// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for Courier workers and the supervisor.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, `COURIER_*` environment variable overrides, and
//! miette diagnostics with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use courier_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("queue backlog: {}", config.queue.max_backlog);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError, SourceIndex};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::CourierConfig;

use tracing::debug;

/// Load configuration from the XDG hierarchy and validate it.
///
/// Returns either a valid `CourierConfig` or every diagnostic found.
pub fn load_and_validate() -> Result<CourierConfig, Vec<ConfigError>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Load configuration from a specific file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &std::path::Path) -> Result<CourierConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        let mut sources = SourceIndex::new();
        if let Ok(content) = std::fs::read_to_string(path) {
            sources.add(path.display().to_string(), content);
        }
        sources
    })
}

/// Load configuration from a TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<CourierConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        let mut sources = SourceIndex::new();
        sources.add("<inline>", toml_content);
        sources
    })
}

fn finish(
    loaded: Result<CourierConfig, figment::Error>,
    sources: impl FnOnce() -> SourceIndex,
) -> Result<CourierConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            debug!("configuration loaded and validated");
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// Read the TOML files of the XDG hierarchy for error span resolution.
fn collect_toml_sources() -> SourceIndex {
    let mut sources = SourceIndex::new();

    let mut candidates = vec![std::path::PathBuf::from("/etc/courier/courier.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("courier/courier.toml"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("courier.toml"));
    }

    for path in candidates {
        if let Ok(content) = std::fs::read_to_string(&path) {
            sources.add(path.display().to_string(), content);
        }
    }

    sources
}
