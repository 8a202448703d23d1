//! In-memory [`CheckpointStore`] for tests.
//!
//! A `HashMap` behind a `std::sync::Mutex`; the sequence counter is bumped
//! under the same lock so concurrent writers cannot interleave.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::CheckpointStore;
use crate::models::CheckpointRecord;

#[derive(Default)]
struct Inner {
    records: HashMap<String, CheckpointRecord>,
    seq: u64,
}

/// In-memory checkpoint store.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    inner: Mutex<Inner>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get(&self, key: &str) -> Result<Option<CheckpointRecord>> {
        let inner = self.inner.lock().map_err(|_| anyhow!("checkpoint store poisoned"))?;
        Ok(inner.records.get(key).cloned())
    }

    async fn put(&self, record: &CheckpointRecord) -> Result<u64> {
        let mut inner = self.inner.lock().map_err(|_| anyhow!("checkpoint store poisoned"))?;
        inner.seq += 1;
        let seq = inner.seq;
        let mut stored = record.clone();
        stored.seq = seq;
        inner.records.insert(stored.key.clone(), stored);
        Ok(seq)
    }

    async fn all(&self) -> Result<Vec<CheckpointRecord>> {
        let inner = self.inner.lock().map_err(|_| anyhow!("checkpoint store poisoned"))?;
        let mut records: Vec<CheckpointRecord> = inner.records.values().cloned().collect();
        records.sort_by_key(|r| r.seq);
        Ok(records)
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| anyhow!("checkpoint store poisoned"))?;
        inner.records.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckpointStatus;

    #[tokio::test]
    async fn last_write_wins_per_key() {
        let store = InMemoryCheckpointStore::new();
        let pending = CheckpointRecord::pending("a.md", 1, "h");
        let s1 = store.put(&pending).await.unwrap();
        let s2 = store.put(&pending.clone().failed("network", "x")).await.unwrap();
        assert!(s2 > s1);

        let rec = store.get("a.md").await.unwrap().unwrap();
        assert_eq!(rec.status, CheckpointStatus::Failed);
        assert_eq!(rec.seq, s2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn all_is_ordered_by_seq() {
        let store = InMemoryCheckpointStore::new();
        store.put(&CheckpointRecord::pending("b.md", 1, "h")).await.unwrap();
        store.put(&CheckpointRecord::pending("a.md", 1, "h")).await.unwrap();
        store.put(&CheckpointRecord::pending("b.md", 1, "h")).await.unwrap();

        let keys: Vec<String> = store.all().await.unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["a.md", "b.md"]);
    }

    #[tokio::test]
    async fn clear_keeps_sequence_monotonic() {
        let store = InMemoryCheckpointStore::new();
        let s1 = store.put(&CheckpointRecord::pending("a.md", 1, "h")).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.is_empty());
        let s2 = store.put(&CheckpointRecord::pending("a.md", 1, "h")).await.unwrap();
        assert!(s2 > s1);
    }
}
