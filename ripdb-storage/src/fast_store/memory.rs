//! Process-local fast store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use ripdb_core::FastStoreError;

use super::{FastStore, StoreStats};

/// `HashMap`-backed fast store.
#[derive(Debug, Default)]
pub struct InMemoryFastStore {
    entries: RwLock<HashMap<String, String>>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryFastStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of usage counters.
    pub fn stats(&self) -> StoreStats {
        let entry_count = self
            .entries
            .read()
            .map(|entries| entries.len() as u64)
            .unwrap_or(0);
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            entry_count,
        }
    }

    /// Remove a key, returning whether it existed. Simulates external eviction.
    pub fn evict(&self, key: &str) -> Result<bool, FastStoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| FastStoreError::LockPoisoned)?;
        Ok(entries.remove(key).is_some())
    }
}

#[async_trait]
impl FastStore for InMemoryFastStore {
    async fn get(&self, key: &str) -> Result<Option<String>, FastStoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| FastStoreError::LockPoisoned)?;
        let value = entries.get(key).cloned();
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), FastStoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| FastStoreError::LockPoisoned)?;
        entries.insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = InMemoryFastStore::new();
        assert_eq!(store.get("absent").await.unwrap(), None);
        assert_eq!(store.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = InMemoryFastStore::new();
        store.set("k", "one".to_string()).await.unwrap();
        store.set("k", "two".to_string()).await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
        let stats = store.stats();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_evict() {
        let store = InMemoryFastStore::new();
        store.set("k", "v".to_string()).await.unwrap();
        assert!(store.evict("k").unwrap());
        assert!(!store.evict("k").unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
