//! Configuration validation.
//!
//! Detects unknown or misspelled fields in config files and reports
//! semantic problems in a parsed [`CourierConfig`].

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{loader, schema::CourierConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "value", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "server.port"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn error(category: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category,
            path: path.into(),
            message: message.into(),
        }
    }

    fn warning(category: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        (
            "server",
            Struct(HashMap::from([
                ("bind", Leaf),
                ("port", Leaf),
                ("enable_websocket", Leaf),
                ("max_body_bytes", Leaf),
            ])),
        ),
        ("database", Struct(HashMap::from([("url", Leaf)]))),
        (
            "messages",
            Struct(HashMap::from([
                ("default_bulk_delay_ms", Leaf),
                ("default_page_size", Leaf),
            ])),
        ),
        (
            "whatsapp",
            Struct(HashMap::from([
                ("sidecar_port", Leaf),
                ("sidecar_dir", Leaf),
                ("auth_dir", Leaf),
                ("auto_start_sidecar", Leaf),
                ("request_timeout_secs", Leaf),
                ("sessions", Leaf),
            ])),
        ),
        (
            "webhook",
            Struct(HashMap::from([
                ("url", Leaf),
                ("events", Leaf),
                ("timeout_secs", Leaf),
            ])),
        ),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at `path`, or the discovered one when `None`.
#[must_use]
pub fn validate_file(path: Option<&Path>) -> ValidationResult {
    let Some(config_path) = path.map(Path::to_path_buf).or_else(loader::find_config_file) else {
        let mut result = validate(&CourierConfig::default());
        result.diagnostics.insert(0, Diagnostic {
            severity: Severity::Info,
            category: "file-ref",
            path: String::new(),
            message: "no config file found; using defaults".into(),
        });
        return result;
    };

    let mut result = match std::fs::read_to_string(&config_path) {
        Ok(content) => validate_str(&crate::env_subst::substitute_env(&content), &config_path),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::error(
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(config_path);
    result
}

/// Validate raw config text; the format is taken from `path`'s extension.
fn validate_str(raw: &str, path: &Path) -> ValidationResult {
    let value = match loader::parse_config_value(raw, path) {
        Ok(Value::Null) => Value::Object(Default::default()),
        Ok(v) => v,
        Err(e) => {
            return ValidationResult {
                diagnostics: vec![Diagnostic::error("syntax", "", format!("syntax error: {e}"))],
                config_path: None,
            };
        },
    };

    let mut diagnostics = Vec::new();
    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<CourierConfig>(value) {
        Ok(config) => {
            diagnostics.extend(validate(&config).diagnostics);
        },
        Err(e) => diagnostics.push(Diagnostic::error(
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match fields.get(key.as_str()) {
            Some(child_schema) => check_unknown_fields(child, child_schema, &path, diagnostics),
            None => {
                let message = match suggest(key, &known_keys, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                diagnostics.push(Diagnostic::error("unknown-field", path, message));
            },
        }
    }
}

/// Semantic checks on a parsed config.
#[must_use]
pub fn validate(config: &CourierConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();

    if config.server.port == 0 {
        diagnostics.push(Diagnostic::error("value", "server.port", "port must not be 0"));
    }
    if config.server.max_body_bytes == 0 {
        diagnostics.push(Diagnostic::error(
            "value",
            "server.max_body_bytes",
            "body limit must be positive",
        ));
    }
    if config.messages.default_page_size == 0 {
        diagnostics.push(Diagnostic::error(
            "value",
            "messages.default_page_size",
            "page size must be positive",
        ));
    }
    if config.messages.default_bulk_delay_ms == 0 {
        diagnostics.push(Diagnostic::warning(
            "value",
            "messages.default_bulk_delay_ms",
            "bulk sends without a pause are likely to be rate limited",
        ));
    }
    if config.whatsapp.request_timeout_secs == 0 {
        diagnostics.push(Diagnostic::error(
            "value",
            "whatsapp.request_timeout_secs",
            "timeout must be positive",
        ));
    }

    let mut seen = HashSet::new();
    for (i, id) in config.whatsapp.sessions.iter().enumerate() {
        let path = format!("whatsapp.sessions[{i}]");
        if id.trim().is_empty() {
            diagnostics.push(Diagnostic::error("value", path, "session id is empty"));
        } else if !seen.insert(id.as_str()) {
            diagnostics.push(Diagnostic::error(
                "value",
                path,
                format!("duplicate session id \"{id}\""),
            ));
        }
    }

    if let Some(url) = &config.webhook.url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        diagnostics.push(Diagnostic::error(
            "value",
            "webhook.url",
            "webhook url must start with http:// or https://",
        ));
    }
    if config.webhook.url.is_some() && config.webhook.timeout_secs == 0 {
        diagnostics.push(Diagnostic::error(
            "value",
            "webhook.timeout_secs",
            "timeout must be positive",
        ));
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
