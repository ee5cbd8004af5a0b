//! Persistence capabilities for window snapshots.
//!
//! A limiter reads its last snapshot with [`Store::get`] when it is loaded
//! and writes a new one with [`Store::set`] after every accepted update.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::ratelimit::Snapshot;

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("snapshot codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Trait for snapshot persistence.
///
/// Implementations replace any prior value on `set`. No read-modify-write
/// atomicity is expected; limiters racing on the same name may both admit.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch the last snapshot stored under `name`, if any.
    async fn get(&self, name: &str) -> Result<Option<Snapshot>, StoreError>;

    /// Store `snapshot` under `name`.
    async fn set(&self, name: &str, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// A store that keeps nothing.
///
/// `get` always reports no snapshot and `set` discards its input.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

#[async_trait]
impl Store for NullStore {
    async fn get(&self, _name: &str) -> Result<Option<Snapshot>, StoreError> {
        Ok(None)
    }

    async fn set(&self, _name: &str, _snapshot: &Snapshot) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_store_keeps_nothing() {
        let store = NullStore;
        let snapshot = Snapshot {
            buckets: vec![1.0, 2.0],
            updated: "2025-01-01T00:00:00Z".to_string(),
            unit: "second".to_string(),
            width: 1,
        };

        store.set("anything", &snapshot).await.unwrap();
        assert!(store.get("anything").await.unwrap().is_none());
    }
}
