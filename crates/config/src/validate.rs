//! Configuration validation.
//!
//! Loads a config file and reports problems that would stop the bridge from
//! starting or make it behave surprisingly.

use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;

use crate::schema::FerryConfig;

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
    /// Category: "syntax", "missing", "range", "policy", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "discord.channel_ids"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
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

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        let mut diagnostics = vec![Diagnostic::new(
            Severity::Info,
            "file-ref",
            "",
            "no config file found; using defaults",
        )];
        diagnostics.extend(validate_config(&crate::loader::apply_env_overrides(
            FerryConfig::default(),
        )));
        return ValidationResult {
            diagnostics,
            config_path: None,
        };
    };

    let mut diagnostics: Vec<Diagnostic> = std::fs::read_to_string(actual_path)
        .map(|raw| crate::env_subst::unresolved_vars(&raw))
        .unwrap_or_default()
        .into_iter()
        .map(|name| {
            Diagnostic::new(
                Severity::Warning,
                "file-ref",
                "",
                format!("${{{name}}} is referenced but not set in the environment"),
            )
        })
        .collect();
    match crate::loader::load_config(actual_path) {
        Ok(config) => diagnostics.extend(validate_config(&config)),
        Err(e) => diagnostics.push(Diagnostic::new(Severity::Error, "syntax", "", e.to_string())),
    }
    ValidationResult {
        diagnostics,
        config_path,
    }
}

/// Semantic checks on an already parsed config.
#[must_use]
pub fn validate_config(config: &FerryConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.telegram.token.expose_secret().trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing",
            "telegram.token",
            "telegram bot token is not set (config or FERRY_TELEGRAM_TOKEN)",
        ));
    }
    if config.telegram.source_chat_id == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing",
            "telegram.source_chat_id",
            "source chat id is not set",
        ));
    }
    if config.discord.token.expose_secret().trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing",
            "discord.token",
            "discord bot token is not set (config or FERRY_DISCORD_TOKEN)",
        ));
    }
    if config.discord.channel_ids.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing",
            "discord.channel_ids",
            "no destination channels configured",
        ));
    }
    for (i, id) in config.discord.channel_ids.iter().enumerate() {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "range",
                format!("discord.channel_ids[{i}]"),
                format!("\"{id}\" does not look like a Discord snowflake"),
            ));
        }
    }

    if config.telegram.poll_timeout_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "range",
            "telegram.poll_timeout_secs",
            "a zero poll timeout turns long polling into busy polling",
        ));
    }
    if config.bridge.retention_days == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "range",
            "bridge.retention_days",
            "correlations are swept immediately; edits and replies will not propagate",
        ));
    }
    if config.bridge.sweep_interval_hours == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "bridge.sweep_interval_hours",
            "sweep interval must be at least one hour",
        ));
    }

    for entry in &config.bridge.allowlist {
        let normalized = entry.trim_start_matches('@');
        if config
            .bridge
            .blocklist
            .iter()
            .any(|b| b.trim_start_matches('@').eq_ignore_ascii_case(normalized))
        {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "policy",
                "bridge.allowlist",
                format!("\"{entry}\" is both allowed and blocked; the block wins"),
            ));
        }
    }

    diagnostics
}
