//! Correlation storage and forwarding policy between the Telegram feed and
//! Discord.
//!
//! The [`Bridge`] listens on the update feed; every copy it forwards is
//! recorded in a [`CorrelationStore`] so later edits and replies can find
//! their destination messages. [`spawn_retention_sweep`] expires old rows.

pub mod bridge;
pub mod checkpoint;
pub mod error;
pub mod filters;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod sweep;

use std::path::Path;

use crate::error::Context;

pub use {
    bridge::{
        Bridge, BridgeSettings, Classification, DeliveryFailure, OrphanAction, Outcome,
    },
    checkpoint::SqliteCheckpointStore,
    error::{Error, Result},
    filters::{AllowlistCheck, BlocklistCheck, FreshnessCheck, SourceChatCheck, standard_checks},
    store::CorrelationStore,
    store_memory::InMemoryStore,
    store_sqlite::SqliteCorrelationStore,
    sweep::{spawn_retention_sweep, sweep_once},
};

/// Run database migrations for the bridge crate.
///
/// Creates the `correlations` and `feed_checkpoints` tables.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}

/// Open (creating if needed) the SQLite database at `path`.
pub async fn open_pool(path: &Path) -> Result<sqlx::SqlitePool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db_url = format!("sqlite:{}?mode=rwc", path.display());
    let pool = sqlx::SqlitePool::connect(&db_url).await?;
    tracing::debug!(path = %path.display(), "database opened");
    Ok(pool)
}
