use std::path::Path;

use {
    ferry_bridge::{SqliteCorrelationStore, sweep_once},
    tracing::info,
};

use crate::run_command;

/// Run a single retention sweep against the configured database.
pub async fn prune(config_path: Option<&Path>, older_than_days: Option<u32>) -> anyhow::Result<()> {
    let config = run_command::load(config_path)?;
    let days = older_than_days.unwrap_or(config.bridge.retention_days);

    let pool = run_command::open_database(&config).await?;
    let store = SqliteCorrelationStore::with_pool(pool.clone());
    let removed = sweep_once(
        &store,
        run_command::retention(days),
        ferry_common::time::unix_now(),
    )
    .await?;
    pool.close().await;

    info!(removed, days, "prune finished");
    println!("Removed {removed} correlation(s) older than {days} day(s).");
    Ok(())
}
