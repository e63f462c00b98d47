//! SQLite-backed feed checkpoints.

use {
    async_trait::async_trait,
    ferry_telegram::CheckpointStore,
    sqlx::{Row, SqlitePool},
};

use crate::Error;

/// Persists update feed cursors in the `feed_checkpoints` table.
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, feed: &str) -> ferry_channels::Result<Option<i64>> {
        let row = sqlx::query("SELECT cursor FROM feed_checkpoints WHERE feed = ?")
            .bind(feed)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(row.map(|r| r.get::<i64, _>("cursor")))
    }

    async fn save(&self, feed: &str, cursor: i64) -> ferry_channels::Result<()> {
        sqlx::query(
            "INSERT INTO feed_checkpoints (feed, cursor, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(feed) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at",
        )
        .bind(feed)
        .bind(cursor)
        .bind(ferry_common::time::unix_now())
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, sqlx::sqlite::SqlitePoolOptions};

    #[tokio::test]
    async fn save_overwrites_and_load_reads_back() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::run_migrations(&pool).await.unwrap();
        let store = SqliteCheckpointStore::with_pool(pool);

        assert_eq!(store.load("telegram").await.unwrap(), None);
        store.save("telegram", 41).await.unwrap();
        store.save("telegram", 42).await.unwrap();
        assert_eq!(store.load("telegram").await.unwrap(), Some(42));
        assert_eq!(store.load("other").await.unwrap(), None);
    }
}
