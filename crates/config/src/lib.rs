//! Configuration loading, validation, and env substitution.
//!
//! Config files: `ferry.toml`, `ferry.yaml`, or `ferry.json`
//! Searched in `./` then `~/.config/ferry/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, config_dir, data_dir, discover_and_load, find_config_file,
        load_config, resolve_database_path, save_config,
    },
    schema::{
        BridgeConfig, DISCORD_ORIGIN, DiscordConfig, FerryConfig, OrphanPolicy, SenderDisplay,
        StorageConfig, TelegramConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_config},
};
