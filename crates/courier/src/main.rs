// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - resilient per-tenant chat workers.
//!
//! This binary validates and inspects the configuration shared by tenant
//! workers and the supervisor.

mod check;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use courier_config::CourierConfig;
use tracing::debug;

/// Courier - resilient per-tenant chat workers.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Read this file instead of the standard config locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and report on risky settings.
    Check {
        /// Also require the settings a tenant worker needs.
        #[arg(long)]
        worker: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Print the effective configuration after defaults and overrides.
    Show {
        #[arg(long, value_enum, default_value_t = Format::Toml)]
        format: Format,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Toml,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.worker.log_level);
    debug!(path = ?cli.config, "configuration loaded");

    match cli.command {
        Commands::Check { worker, plain } => {
            let results = check::run_checks(&config, worker);
            if check::print_report(&results, plain) > 0 {
                return ExitCode::FAILURE;
            }
        }
        Commands::Show { format } => match render(&config, format) {
            Ok(text) => print!("{text}"),
            Err(e) => {
                eprintln!("courier: failed to render configuration: {e}");
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}

fn load(path: Option<&Path>) -> Result<CourierConfig, Vec<courier_config::ConfigError>> {
    match path {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    }
}

fn render(config: &CourierConfig, format: Format) -> Result<String, String> {
    match format {
        Format::Toml => toml::to_string_pretty(config).map_err(|e| e.to_string()),
        Format::Json => serde_json::to_string_pretty(config)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .map_err(|e| e.to_string()),
    }
}

/// Initialize the tracing subscriber with an env filter.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_subcommands_and_global_config() {
        let cli = Cli::try_parse_from(["courier", "show", "--format", "json", "--config", "c.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(cli.command, Commands::Show { format: Format::Json }));

        let cli = Cli::try_parse_from(["courier", "check", "--plain"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Check {
                worker: false,
                plain: true
            }
        ));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["courier"]).is_err());
    }

    #[test]
    fn loads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\ntenant_id = \"tenant-9\"\n\n[queue]\nmax_backlog = 3").unwrap();

        let config = load(Some(file.path())).expect("file should load");
        assert_eq!(config.worker.tenant_id.as_deref(), Some("tenant-9"));
        assert_eq!(config.queue.max_backlog, 3);
    }

    #[test]
    fn invalid_file_yields_diagnostics() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[queue]\nmax_backlog = 0").unwrap();

        let errors = load(Some(file.path())).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn shown_toml_reloads_to_the_same_values() {
        let mut config = CourierConfig::default();
        config.rate_limit.max_requests = 4;
        let text = render(&config, Format::Toml).unwrap();
        let reloaded = courier_config::load_and_validate_str(&text).unwrap();
        assert_eq!(reloaded.rate_limit.max_requests, 4);
    }

    #[test]
    fn json_output_names_every_section() {
        let text = render(&CourierConfig::default(), Format::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        for section in ["worker", "queue", "dedup", "rate_limit", "reconnect", "heartbeat", "supervisor", "notices"] {
            assert!(value.get(section).is_some(), "missing {section}");
        }
    }
}
