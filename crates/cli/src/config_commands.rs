use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use ferry_config::{Severity, ValidationResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the config file in use and the resolved database path.
    Path,
}

pub fn handle_config(action: ConfigAction, config_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(verbose, config_path),
        ConfigAction::Path => path(config_path),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(verbose: bool, config_path: Option<&Path>) -> Result<()> {
    let result = ferry_config::validate(config_path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    for line in diagnostic_lines(&result, verbose) {
        eprintln!("  {line}");
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("\n{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn diagnostic_lines(result: &ValidationResult, verbose: bool) -> Vec<String> {
    result
        .diagnostics
        .iter()
        .filter(|d| verbose || d.severity != Severity::Info)
        .map(|d| {
            let (color, label) = match d.severity {
                Severity::Error => (RED, "error"),
                Severity::Warning => (YELLOW, "warning"),
                Severity::Info => (CYAN, "info"),
            };
            if d.path.is_empty() {
                format!("{BOLD}{color}{label}{RESET} {}", d.message)
            } else {
                format!("{BOLD}{color}{label}{RESET} {}: {}", d.path, d.message)
            }
        })
        .collect()
}

fn path(config_path: Option<&Path>) -> Result<()> {
    let found = config_path
        .map(Path::to_path_buf)
        .or_else(ferry_config::find_config_file);
    match &found {
        Some(p) => println!("config:   {}", p.display()),
        None => match ferry_config::config_dir() {
            Some(dir) => println!("config:   (none; searched ./ and {})", dir.display()),
            None => println!("config:   (none; searched ./)"),
        },
    }

    let config = crate::run_command::load(config_path)?;
    let db = ferry_config::resolve_database_path(&config, ferry_config::data_dir().as_deref());
    println!("database: {}", db.display());
    Ok(())
}
