//! Correlation persistence trait.

use {async_trait::async_trait, ferry_channels::DestRef};

use crate::Result;

/// Maps source message ids to the destination copies forwarded for them.
///
/// A destination message id belongs to at most one source message; adding
/// it twice fails with [`crate::Error::DuplicateDestination`].
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    async fn add(&self, source_id: i64, dest: &DestRef, timestamp: i64) -> Result<()>;

    /// Refresh the timestamp of every copy of `source_id`; returns rows touched.
    async fn touch(&self, source_id: i64, timestamp: i64) -> Result<u64>;

    async fn delete_by_source(&self, source_id: i64) -> Result<u64>;

    /// Remove rows with `timestamp <= threshold`.
    async fn delete_older_than(&self, threshold: i64) -> Result<u64>;

    /// Destination copies of `source_id` in insertion order.
    async fn get(&self, source_id: i64) -> Result<Vec<DestRef>>;
}
