//! LMDB-backed fast store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep envelopes in a
//! memory-mapped, crash-safe file. Suitable when the fast tier lives on the
//! same host as the orchestrator.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get`
//! - Write transactions for `set`, which LMDB serializes
//! - Atomic counters for statistics

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions};
use ripdb_core::FastStoreError;

use super::{FastStore, StoreStats};

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbStoreError to FastStoreError.
impl From<LmdbStoreError> for FastStoreError {
    fn from(e: LmdbStoreError) -> Self {
        FastStoreError::ConnectionFailed {
            reason: e.to_string(),
        }
    }
}

/// Name of the LMDB sub-database holding envelopes.
const ENVELOPE_DB: &str = "envelopes";

/// LMDB-backed fast store.
///
/// # Example
///
/// ```ignore
/// let store = LmdbFastStore::open("/var/lib/ripdb", 256)?;
/// store.set("user:1", raw_envelope).await?;
/// ```
pub struct LmdbFastStore {
    env: Env,
    db: Database<Str, Str>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl LmdbFastStore {
    /// Open or create an LMDB store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, Some(ENVELOPE_DB))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        })
    }

    /// Snapshot of usage counters.
    pub fn stats(&self) -> Result<StoreStats, LmdbStoreError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let entry_count = self
            .db
            .len(&rtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            entry_count,
        })
    }
}

#[async_trait]
impl FastStore for LmdbFastStore {
    async fn get(&self, key: &str) -> Result<Option<String>, FastStoreError> {
        let read_failed = |e: heed::Error| FastStoreError::ReadFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let rtxn = self.env.read_txn().map_err(read_failed)?;
        let value = self
            .db
            .get(&rtxn, key)
            .map_err(read_failed)?
            .map(str::to_owned);

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), FastStoreError> {
        let write_failed = |e: heed::Error| FastStoreError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let mut wtxn = self.env.write_txn().map_err(write_failed)?;
        self.db
            .put(&mut wtxn, key, value.as_str())
            .map_err(write_failed)?;
        wtxn.commit().map_err(write_failed)?;

        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) -> Result<(), FastStoreError> {
        self.env
            .force_sync()
            .map_err(|e| FastStoreError::ConnectionFailed {
                reason: format!("LMDB sync failed: {}", e),
            })
    }
}

impl std::fmt::Debug for LmdbFastStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbFastStore")
            .field("path", &self.env.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, LmdbFastStore) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbFastStore::open(temp_dir.path(), 10).expect("LMDB store should open");
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (_dir, store) = open_store();
        store
            .set("user:1", r#"{"cid":"pending","data":1}"#.to_string())
            .await
            .unwrap();

        let value = store.get("user:1").await.unwrap();
        assert_eq!(value.as_deref(), Some(r#"{"cid":"pending","data":1}"#));
        assert_eq!(store.get("user:2").await.unwrap(), None);

        let stats = store.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_single_entry() {
        let (_dir, store) = open_store();
        store.set("k", "a".to_string()).await.unwrap();
        store.set("k", "b".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.stats().unwrap().entry_count, 1);
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store = LmdbFastStore::open(temp_dir.path(), 10).unwrap();
            store.set("k", "durable".to_string()).await.unwrap();
            store.close().await.unwrap();
        }

        let store = LmdbFastStore::open(temp_dir.path(), 10).unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("durable"));
    }
}
