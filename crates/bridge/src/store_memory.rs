//! In-memory correlation store for tests.

use std::sync::Mutex;

use {async_trait::async_trait, ferry_channels::DestRef};

use crate::{Error, Result, store::CorrelationStore};

#[derive(Debug, Clone)]
struct Row {
    source_id: i64,
    dest: DestRef,
    timestamp: i64,
}

/// In-memory store backed by a `Vec`. Nothing is persisted.
#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<Vec<Row>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamp recorded for `dest_msg_id`.
    pub fn timestamp_of(&self, dest_msg_id: &str) -> Option<i64> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.iter()
            .find(|r| r.dest.message_id == dest_msg_id)
            .map(|r| r.timestamp)
    }
}

#[async_trait]
impl CorrelationStore for InMemoryStore {
    async fn add(&self, source_id: i64, dest: &DestRef, timestamp: i64) -> Result<()> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        if rows.iter().any(|r| r.dest.message_id == dest.message_id) {
            return Err(Error::DuplicateDestination {
                dest_msg_id: dest.message_id.clone(),
            });
        }
        rows.push(Row {
            source_id,
            dest: dest.clone(),
            timestamp,
        });
        Ok(())
    }

    async fn touch(&self, source_id: i64, timestamp: i64) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let mut touched = 0;
        for row in rows.iter_mut().filter(|r| r.source_id == source_id) {
            row.timestamp = timestamp;
            touched += 1;
        }
        Ok(touched)
    }

    async fn delete_by_source(&self, source_id: i64) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let before = rows.len();
        rows.retain(|r| r.source_id != source_id);
        Ok((before - rows.len()) as u64)
    }

    async fn delete_older_than(&self, threshold: i64) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let before = rows.len();
        rows.retain(|r| r.timestamp > threshold);
        Ok((before - rows.len()) as u64)
    }

    async fn get(&self, source_id: i64) -> Result<Vec<DestRef>> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows
            .iter()
            .filter(|r| r.source_id == source_id)
            .map(|r| r.dest.clone())
            .collect())
    }
}
