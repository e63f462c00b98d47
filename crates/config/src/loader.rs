use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::FerryConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["ferry.toml", "ferry.yaml", "ferry.yml", "ferry.json"];

/// Environment variables that override tokens from the file.
pub const TELEGRAM_TOKEN_ENV: &str = "FERRY_TELEGRAM_TOKEN";
pub const DISCORD_TOKEN_ENV: &str = "FERRY_DISCORD_TOKEN";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<FerryConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    let config = parse_config(&raw, path)?;
    Ok(apply_env_overrides(config))
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./ferry.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/ferry/ferry.{toml,yaml,yml,json}` (user-global)
///
/// Returns `FerryConfig::default()` (plus env overrides) if no config file is
/// found or it fails to parse.
pub fn discover_and_load() -> FerryConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    apply_env_overrides(FerryConfig::default())
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/ferry/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ferry").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user-global data directory (`~/.local/share/ferry/`).
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ferry").map(|d| d.data_dir().to_path_buf())
}

/// Resolve the database path: absolute paths are kept, relative ones are
/// placed under `data_dir` (or the working directory when unknown).
pub fn resolve_database_path(config: &FerryConfig, data_dir: Option<&Path>) -> PathBuf {
    let path = &config.storage.database_path;
    if path.is_absolute() {
        return path.clone();
    }
    match data_dir {
        Some(dir) => dir.join(path),
        None => path.clone(),
    }
}

/// Apply `FERRY_*_TOKEN` environment overrides.
pub fn apply_env_overrides(config: FerryConfig) -> FerryConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: FerryConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> FerryConfig {
    if let Some(token) = lookup(TELEGRAM_TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
        config.telegram.token = Secret::new(token);
    }
    if let Some(token) = lookup(DISCORD_TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
        config.discord.token = Secret::new(token);
    }
    config
}

/// Serialize `config` to TOML at `path`, creating parent directories.
pub fn save_config(config: &FerryConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(config)?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

pub(crate) fn parse_config(raw: &str, path: &Path) -> Result<FerryConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema::OrphanPolicy, secrecy::ExposeSecret};

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferry.toml");
        std::fs::write(
            &path,
            "[discord]\nchannel_ids = [\"1\"]\n[bridge]\norphan_policy = \"drop\"\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.discord.channel_ids, vec!["1"]);
        assert_eq!(cfg.bridge.orphan_policy, OrphanPolicy::Drop);
    }

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferry.yaml");
        std::fs::write(
            &path,
            "telegram:\n  source_chat_id: -10042\nbridge:\n  retention_days: 7\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.telegram.source_chat_id, -100_42);
        assert_eq!(cfg.bridge.retention_days, 7);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = parse_config("", Path::new("ferry.ini")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/ferry.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ferry.toml"));
    }

    #[test]
    fn env_overrides_replace_tokens() {
        let lookup = |name: &str| match name {
            TELEGRAM_TOKEN_ENV => Some("tg-from-env".to_string()),
            DISCORD_TOKEN_ENV => Some("  ".to_string()),
            _ => None,
        };
        let mut cfg = FerryConfig::default();
        cfg.discord.token = Secret::new("from-file".into());
        let cfg = apply_env_overrides_with(cfg, lookup);
        assert_eq!(cfg.telegram.token.expose_secret(), "tg-from-env");
        // blank env values do not clobber the file
        assert_eq!(cfg.discord.token.expose_secret(), "from-file");
    }

    #[test]
    fn relative_database_path_goes_under_data_dir() {
        let cfg = FerryConfig::default();
        let resolved = resolve_database_path(&cfg, Some(Path::new("/var/lib/ferry")));
        assert_eq!(resolved, PathBuf::from("/var/lib/ferry/ferry.db"));
        assert_eq!(resolve_database_path(&cfg, None), PathBuf::from("ferry.db"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ferry.toml");
        let mut cfg = FerryConfig::default();
        cfg.discord.channel_ids = vec!["9".into()];
        save_config(&cfg, &path).unwrap();
        let back = load_config(&path).unwrap();
        assert_eq!(back.discord.channel_ids, vec!["9"]);
    }
}
