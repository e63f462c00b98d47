//! `ferry run`: wire the Telegram feed, the bridge, and the retention sweep.

use std::{path::Path, sync::Arc, time::Duration};

use {
    anyhow::{Context, bail},
    ferry_bridge::{
        Bridge, BridgeSettings, CorrelationStore, SqliteCheckpointStore, SqliteCorrelationStore,
        spawn_retention_sweep, standard_checks,
    },
    ferry_channels::SourceConnector,
    ferry_config::{FerryConfig, Severity},
    ferry_discord::DiscordOutbound,
    ferry_telegram::{FeedConfig, TelegramConnector, UpdateFeed},
    secrecy::ExposeSecret,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

/// Load the explicit config file, or discover one.
pub fn load(config_path: Option<&Path>) -> anyhow::Result<FerryConfig> {
    match config_path.map(Path::to_path_buf).or_else(ferry_config::find_config_file) {
        Some(path) => ferry_config::load_config(&path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(ferry_config::apply_env_overrides(FerryConfig::default())),
    }
}

/// Open the database and apply migrations.
pub async fn open_database(config: &FerryConfig) -> anyhow::Result<sqlx::SqlitePool> {
    let db_path = ferry_config::resolve_database_path(config, ferry_config::data_dir().as_deref());
    let pool = ferry_bridge::open_pool(&db_path)
        .await
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    ferry_bridge::run_migrations(&pool).await?;
    info!(path = %db_path.display(), "database ready");
    Ok(pool)
}

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load(config_path)?;

    let diagnostics = ferry_config::validate_config(&config);
    for d in &diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, reason = %d.message, "config error"),
            Severity::Warning => warn!(path = %d.path, reason = %d.message, "config warning"),
            Severity::Info => {},
        }
    }
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        bail!("configuration is invalid; run `ferry config check` for details");
    }

    let pool = open_database(&config).await?;
    let store: Arc<dyn CorrelationStore> =
        Arc::new(SqliteCorrelationStore::with_pool(pool.clone()));
    let checkpoints = Arc::new(SqliteCheckpointStore::with_pool(pool.clone()));

    let destination = Arc::new(DiscordOutbound::new(&config.discord)?);

    let feed_config = FeedConfig::from(&config.telegram);
    let connector = Arc::new(TelegramConnector::new(feed_config.poll_timeout));
    let media_source = connector.connect(config.telegram.token.expose_secret())?;

    let bridge = Arc::new(
        Bridge::new(
            Arc::clone(&store),
            destination,
            BridgeSettings::from_config(&config),
        )
        .with_media_source(media_source),
    );

    let mut feed = UpdateFeed::new(connector, feed_config).with_checkpoint(checkpoints);
    for check in standard_checks(&config.bridge, config.telegram.source_chat_id) {
        feed.add_check(check);
    }
    feed.add_listener(bridge.clone(), "message");
    feed.add_listener(bridge, "edited_message");
    feed.start(Some(&config.telegram.token))?;

    let sweep_cancel = CancellationToken::new();
    let sweep = spawn_retention_sweep(
        Arc::clone(&store),
        Duration::from_secs(config.bridge.sweep_interval_hours.saturating_mul(3_600)),
        retention(config.bridge.retention_days),
        sweep_cancel.clone(),
    );

    info!(
        source_chat_id = config.telegram.source_chat_id,
        channels = config.discord.channel_ids.len(),
        "ferry running, press Ctrl-C to stop"
    );

    let feed_stopped = feed.cancellation().unwrap_or_default();
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("shutdown requested");
        },
        _ = feed_stopped.cancelled() => {
            warn!("update feed stopped, shutting down");
        },
    }

    feed.stop().await?;
    sweep_cancel.cancel();
    if let Err(e) = sweep.await {
        warn!(error = %e, "retention sweep ended abnormally");
    }
    pool.close().await;
    info!("ferry stopped");
    Ok(())
}

/// Retention window for `days` days.
pub fn retention(days: u32) -> Duration {
    Duration::from_secs(u64::from(days) * 86_400)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferry.toml");
        std::fs::write(
            &path,
            r#"
            [telegram]
            token = "123:ABC"
            source_chat_id = -100

            [discord]
            token = "discord-token"
            channel_ids = ["1", "2"]
            "#,
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.telegram.source_chat_id, -100);
        assert_eq!(config.discord.channel_ids, vec!["1", "2"]);
    }

    #[test]
    fn broken_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferry.toml");
        std::fs::write(&path, "[telegram\n").unwrap();
        assert!(load(Some(&path)).is_err());
    }
}
