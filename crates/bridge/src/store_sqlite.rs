//! SQLite-backed correlation store using sqlx.

use {
    async_trait::async_trait,
    ferry_channels::DestRef,
    sqlx::{Row, SqlitePool},
};

use crate::{Error, Result, store::CorrelationStore};

/// SQLite-backed persistence for message correlations.
pub struct SqliteCorrelationStore {
    pool: SqlitePool,
}

impl SqliteCorrelationStore {
    /// Create a store using an existing pool (migrations must already be run).
    ///
    /// Call [`crate::run_migrations`] before using this constructor.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CorrelationStore for SqliteCorrelationStore {
    async fn add(&self, source_id: i64, dest: &DestRef, timestamp: i64) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO correlations (dest_msg_id, dest_channel_id, source_msg_id, timestamp)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&dest.message_id)
        .bind(&dest.channel_id)
        .bind(source_id)
        .bind(timestamp)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(Error::DuplicateDestination {
                    dest_msg_id: dest.message_id.clone(),
                })
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn touch(&self, source_id: i64, timestamp: i64) -> Result<u64> {
        let result = sqlx::query("UPDATE correlations SET timestamp = ? WHERE source_msg_id = ?")
            .bind(timestamp)
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_source(&self, source_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM correlations WHERE source_msg_id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_older_than(&self, threshold: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM correlations WHERE timestamp <= ?")
            .bind(threshold)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get(&self, source_id: i64) -> Result<Vec<DestRef>> {
        let rows = sqlx::query(
            "SELECT dest_msg_id, dest_channel_id
             FROM correlations
             WHERE source_msg_id = ?
             ORDER BY rowid ASC",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DestRef {
                message_id: row.get("dest_msg_id"),
                channel_id: row.get("dest_channel_id"),
            })
            .collect())
    }
}
