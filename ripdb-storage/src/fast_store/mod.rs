//! Fast store (hot tier) adapters.
//!
//! The orchestrator only needs string get/set with per-key atomicity. Three
//! implementations are provided:
//!
//! - [`RedisFastStore`] for a shared networked deployment
//! - [`LmdbFastStore`] for a single host with an embedded, durable map
//! - [`InMemoryFastStore`] for tests and throwaway processes

use async_trait::async_trait;
use ripdb_core::FastStoreError;

pub mod lmdb;
pub mod memory;
pub mod redis;

pub use self::lmdb::{LmdbFastStore, LmdbStoreError};
pub use self::memory::InMemoryFastStore;
pub use self::redis::RedisFastStore;

/// Key-value contract consumed by the orchestrator.
///
/// Implementations must make a single `get` or `set` atomic with respect to
/// other operations on the same key. No cross-key guarantees are required.
#[async_trait]
pub trait FastStore: Send + Sync {
    /// Read the raw value at `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>, FastStoreError>;

    /// Overwrite the value at `key`.
    async fn set(&self, key: &str, value: String) -> Result<(), FastStoreError>;

    /// Flush and release resources. Further calls may fail.
    async fn close(&self) -> Result<(), FastStoreError> {
        Ok(())
    }
}

/// Statistics about fast store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Reads that found a value.
    pub hits: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Successful writes.
    pub writes: u64,
    /// Number of keys currently stored.
    pub entry_count: u64,
}

impl StoreStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
