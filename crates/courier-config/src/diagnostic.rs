// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge with "did you mean" suggestions.
//!
//! Unknown keys are matched against the section's valid keys with
//! Jaro-Winkler similarity and, when the offending TOML file is known,
//! labelled at their exact position.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a key to be offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration error with rich diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// An unknown key was found in the configuration.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(courier::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A configuration value has the wrong type.
    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(courier::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    /// A required configuration key is missing.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(courier::config::missing_key),
        help("add `{key} = <value>` to your courier.toml")
    )]
    MissingKey { key: String },

    /// A value deserialized fine but breaks a semantic rule.
    #[error("validation error: {message}")]
    #[diagnostic(code(courier::config::validation))]
    Validation { message: String },

    /// Catch-all for other configuration errors.
    #[error("configuration error: {0}")]
    #[diagnostic(code(courier::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// TOML sources that were merged, keyed by the path figment reports.
#[derive(Debug, Default, Clone)]
pub struct SourceIndex {
    sources: Vec<(String, String)>,
}

impl SourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under the name figment will report for it.
    pub fn add(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.sources.push((name.into(), content.into()));
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, content)| content.as_str())
    }

    /// The only registered source, for inline strings that figment reports without a path.
    fn sole(&self) -> Option<(&str, &str)> {
        match self.sources.as_slice() {
            [(name, content)] => Some((name.as_str(), content.as_str())),
            _ => None,
        }
    }
}

/// Convert a `figment::Error` (which may hold several errors) into diagnostics.
pub fn figment_to_config_errors(err: figment::Error, sources: &SourceIndex) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let section: Vec<String> = error.path.iter().map(|s| s.to_string()).collect();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let suggestion = suggest_key(field, &expected[..]);
                    let (span, src) = locate(&error, &section, field, sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        suggestion,
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: field.to_string(),
                },
                Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                    key: section.join("."),
                    detail: format!("found {actual}, expected {expected}"),
                    expected: expected.clone(),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Resolve the span of `field` inside the file the error came from.
fn locate(
    error: &figment::Error,
    section: &[String],
    field: &str,
    sources: &SourceIndex,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let reported = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    let found = match reported {
        Some(path) => sources.get(&path).map(|content| (path.clone(), content)),
        None => sources
            .sole()
            .map(|(name, content)| (name.to_string(), content)),
    };

    let Some((name, content)) = found else {
        return (None, None);
    };

    let table = match section.split_last() {
        Some((last, parent)) if last == field => parent,
        _ => section,
    };

    match find_key_offset(content, table, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name, content.to_string())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` as a key inside the `[section]` table (or the root
/// table when `section` is empty). The search stops at the next table header.
pub fn find_key_offset(content: &str, section: &[String], field: &str) -> Option<usize> {
    let wanted_header = (!section.is_empty()).then(|| format!("[{}]", section.join(".")));
    let mut in_table = wanted_header.is_none();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            in_table = wanted_header
                .as_deref()
                .is_some_and(|h| trimmed.trim_end().starts_with(h));
        } else if in_table
            && let Some(after) = trimmed.strip_prefix(field)
            && after.trim_start().starts_with('=')
        {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }

    None
}

/// Suggest the most similar valid key, if any is close enough.
pub fn suggest_key<S: AsRef<str>>(unknown: &str, valid_keys: &[S]) -> Option<String> {
    valid_keys
        .iter()
        .map(|k| (k.as_ref(), strsim::jaro_winkler(unknown, k.as_ref())))
        .filter(|(_, score)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(key, _)| key.to_string())
}

/// Render diagnostics to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_close_key() {
        let valid = &["max_requests", "window_ms"];
        assert_eq!(
            suggest_key("max_requets", valid),
            Some("max_requests".to_string())
        );
    }

    #[test]
    fn no_suggestion_for_distant_key() {
        let valid = &["ttl_ms", "capacity", "sweep_interval_ms"];
        assert_eq!(suggest_key("zzzzzz", valid), None);
    }

    #[test]
    fn finds_key_inside_its_table_only() {
        let content = "[queue]\nmax_backlog = 5\n\n[dedup]\ncapcity = 10\n";
        let section = vec!["dedup".to_string()];
        let offset = find_key_offset(content, &section, "capcity").unwrap();
        assert_eq!(&content[offset..offset + 7], "capcity");

        let queue = vec!["queue".to_string()];
        assert_eq!(find_key_offset(content, &queue, "capcity"), None);
    }

    #[test]
    fn ignores_keys_that_only_share_a_prefix() {
        let content = "[dedup]\nttl_ms_extra = 1\nttl_ms = 2\n";
        let section = vec!["dedup".to_string()];
        let offset = find_key_offset(content, &section, "ttl_ms").unwrap();
        assert_eq!(&content[offset..offset + 8], "ttl_ms =");
    }
}
