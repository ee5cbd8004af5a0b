//! In-process snapshot store.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{Store, StoreError};
use crate::ratelimit::Snapshot;

/// Keeps snapshots in memory in their JSON wire form.
///
/// Useful for tests and for embedders that want state shared between
/// limiter instances in one process without durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw JSON stored under `name`.
    pub fn raw(&self, name: &str) -> Option<String> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<Snapshot>, StoreError> {
        match self.raw(name) {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, name: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string(snapshot)?;
        trace!(key = name, bytes = json.len(), "Storing snapshot");
        self.entries.insert(name.to_string(), json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(buckets: Vec<f64>) -> Snapshot {
        Snapshot {
            buckets,
            updated: "2025-01-01T00:00:00+01:00".to_string(),
            unit: "minute".to_string(),
            width: 2,
        }
    }

    #[tokio::test]
    async fn test_memory_store_set_then_get() {
        let store = MemoryStore::new();
        assert!(store.get("login").await.unwrap().is_none());

        store.set("login", &snapshot(vec![1.0, 0.0])).await.unwrap();
        store.set("login", &snapshot(vec![2.5, 1.0])).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("login").await.unwrap(), Some(snapshot(vec![2.5, 1.0])));
    }

    #[test]
    fn test_memory_store_wire_form() {
        let store = MemoryStore::new();
        tokio_test::block_on(store.set("upload", &snapshot(vec![3.0]))).unwrap();

        assert_eq!(
            store.raw("upload").unwrap(),
            r#"{"buckets":[3.0],"updated":"2025-01-01T00:00:00+01:00","unit":"minute","width":2}"#
        );
    }

    #[tokio::test]
    async fn test_memory_store_reports_corrupt_entries() {
        let store = MemoryStore::new();
        store.entries.insert("broken".to_string(), "{not json".to_string());

        let err = store.get("broken").await.unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)));
    }
}
