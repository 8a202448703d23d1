//! Checkpoint storage abstraction.
//!
//! The [`CheckpointStore`] trait is the single boundary where the durability
//! and per-key atomicity rules for checkpoint records are enforced:
//!
//! - at most one record per document key; a later `put` supersedes earlier ones
//! - every `put` gets a store-wide, monotonically increasing `seq`
//! - `put` returns only after the record is durable
//!
//! Implementations must be `Send + Sync`; concurrent `put` calls are
//! serialized inside the store.
//!
//! | Implementation | Use |
//! |----------------|-----|
//! | [`SqliteCheckpointStore`] | production, file-backed |
//! | [`InMemoryCheckpointStore`] | tests |

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::CheckpointRecord;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Current record for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<CheckpointRecord>>;

    /// Insert or replace the record for `record.key`.
    ///
    /// Returns the assigned sequence number.
    async fn put(&self, record: &CheckpointRecord) -> Result<u64>;

    /// All records ordered by sequence number.
    async fn all(&self) -> Result<Vec<CheckpointRecord>>;

    /// Remove every record (fresh runs).
    async fn clear(&self) -> Result<()>;
}
