//! In-memory document store.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::domain::LedgerResult;
use crate::ports::outbound::DocumentStore;

/// Document store backed by a `HashMap`.
///
/// Used for tests and for the `memory` backend. Counts writes so callers can
/// assert that a dry run touched nothing.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Value>>,
    writes: AtomicUsize,
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a key, e.g. with legacy data. Not counted as a write.
    pub fn with_document(self, key: impl Into<String>, value: Value) -> Self {
        self.documents.write().insert(key.into(), value);
        self
    }

    /// Number of `put` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of one key.
    pub fn document(&self, key: &str) -> Option<Value> {
        self.documents.read().get(key).cloned()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, key: &str) -> LedgerResult<Option<Value>> {
        Ok(self.documents.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> LedgerResult<()> {
        debug!("[rank-ledger] memory put '{}'", key);
        self.documents.write().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = InMemoryDocumentStore::new();
        assert!(store.get("user-data").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = InMemoryDocumentStore::new();
        store.put("k", json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_seeded_document_not_counted() {
        let store = InMemoryDocumentStore::new().with_document("k", json!([]));
        assert_eq!(store.write_count(), 0);
        assert_eq!(store.document("k"), Some(json!([])));
    }
}
