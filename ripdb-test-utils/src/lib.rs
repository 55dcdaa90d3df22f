//! RipDB Test Utilities
//!
//! Shared test infrastructure for the RipDB workspace:
//! - A content-addressed in-memory archive with scripted failures
//! - A fast store wrapper with switchable failures
//! - An observer that records background events
//! - Proptest generators for payloads and keys

pub use ripdb_core::{
    ArchiveError, ArchiveState, ContentAddress, Envelope, FastStoreError, FenceToken, RipError,
    RipResult, TransientFailure,
};
pub use ripdb_storage::{
    ArchiveGateway, BackupOutcome, BlobTransport, FastStore, FetchFailure, InMemoryFastStore,
    SetOptions, TierEvent, TierObserver, TierOrchestrator,
};

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Semaphore;

// ============================================================================
// SCRIPTED ARCHIVE
// ============================================================================

/// In-memory content-addressed blob store.
///
/// Addresses are `bafk` followed by the hex SHA-256 of the bytes, so equal
/// payloads always land at the same address. Failures can be queued for the
/// next fetches and stores, and uploads can be held behind a gate.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    blobs: RwLock<HashMap<ContentAddress, Vec<u8>>>,
    fetch_failures: Mutex<VecDeque<FetchFailure>>,
    store_failures: AtomicU32,
    store_gate: Option<Arc<Semaphore>>,
    stores: AtomicU32,
    fetches: AtomicU32,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload waits for one permit from `gate` before completing.
    pub fn with_store_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.store_gate = Some(gate);
        self
    }

    /// Address the store assigns to `bytes`.
    pub fn address_for(bytes: &[u8]) -> ContentAddress {
        let digest = Sha256::digest(bytes);
        ContentAddress::parse(format!("bafk{}", hex::encode(digest)))
            .expect("hex digest is a valid address")
    }

    /// Store `bytes` directly, bypassing counters and scripts.
    pub fn seed(&self, bytes: &[u8]) -> ContentAddress {
        let address = Self::address_for(bytes);
        self.blobs
            .write()
            .expect("test lock should not be poisoned")
            .insert(address.clone(), bytes.to_vec());
        address
    }

    /// Fail the next `count` uploads.
    pub fn fail_next_stores(&self, count: u32) {
        self.store_failures.store(count, Ordering::SeqCst);
    }

    /// Return these failures, in order, from the next fetches.
    pub fn script_fetch_failures(&self, failures: impl IntoIterator<Item = FetchFailure>) {
        self.fetch_failures
            .lock()
            .expect("test lock should not be poisoned")
            .extend(failures);
    }

    pub fn contains(&self, address: &ContentAddress) -> bool {
        self.blobs
            .read()
            .expect("test lock should not be poisoned")
            .contains_key(address)
    }

    pub fn blob(&self, address: &ContentAddress) -> Option<Vec<u8>> {
        self.blobs
            .read()
            .expect("test lock should not be poisoned")
            .get(address)
            .cloned()
    }

    /// Uploads attempted, including failed ones.
    pub fn store_count(&self) -> u32 {
        self.stores.load(Ordering::SeqCst)
    }

    /// Fetches attempted, including failed ones.
    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobTransport for ScriptedTransport {
    async fn put_blob(&self, bytes: &[u8]) -> Result<ContentAddress, ArchiveError> {
        self.stores.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.store_gate {
            let permit = gate.acquire().await.map_err(|_| ArchiveError::WriteFailed {
                reason: "store gate closed".to_string(),
            })?;
            permit.forget();
        }

        let should_fail = self
            .store_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ArchiveError::WriteFailed {
                reason: "scripted upload failure".to_string(),
            });
        }

        Ok(self.seed(bytes))
    }

    async fn get_blob(&self, address: &ContentAddress) -> Result<Vec<u8>, FetchFailure> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .fetch_failures
            .lock()
            .expect("test lock should not be poisoned")
            .pop_front();
        if let Some(failure) = scripted {
            return Err(failure);
        }

        self.blob(address)
            .ok_or(FetchFailure::Transient(TransientFailure::Status(404)))
    }
}

// ============================================================================
// FAILING FAST STORE
// ============================================================================

/// Wraps an [`InMemoryFastStore`], failing reads or writes on demand.
#[derive(Debug, Default)]
pub struct FailingFastStore {
    inner: InMemoryFastStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FailingFastStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryFastStore {
        &self.inner
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl FastStore for FailingFastStore {
    async fn get(&self, key: &str) -> Result<Option<String>, FastStoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(FastStoreError::ReadFailed {
                key: key.to_string(),
                reason: "scripted read failure".to_string(),
            });
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), FastStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FastStoreError::WriteFailed {
                key: key.to_string(),
                reason: "scripted write failure".to_string(),
            });
        }
        self.inner.set(key, value).await
    }
}

// ============================================================================
// RECORDING OBSERVER
// ============================================================================

/// Collects every background event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<TierEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TierEvent> {
        self.events
            .lock()
            .expect("test lock should not be poisoned")
            .clone()
    }

    pub fn failures(&self) -> Vec<TierEvent> {
        self.events()
            .into_iter()
            .filter(TierEvent::is_failure)
            .collect()
    }
}

impl TierObserver for RecordingObserver {
    fn observe(&self, event: &TierEvent) {
        self.events
            .lock()
            .expect("test lock should not be poisoned")
            .push(event.clone());
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Fast store keys of the `namespace:id` shape.
pub fn arb_key() -> impl Strategy<Value = String> {
    "[a-z]{1,8}:[0-9]{1,6}"
}

/// Non-null JSON payloads without floats, nested up to three levels.
pub fn arb_payload() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_transport_is_content_addressed() {
        let transport = ScriptedTransport::new();
        let a = transport.put_blob(b"{\"x\":1}").await.unwrap();
        let b = transport.put_blob(b"{\"x\":1}").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a, ScriptedTransport::address_for(b"{\"x\":1}"));
        assert_eq!(transport.store_count(), 2);
        assert_eq!(transport.get_blob(&a).await.unwrap(), b"{\"x\":1}".to_vec());
    }

    #[tokio::test]
    async fn test_scripted_failures_run_in_order() {
        let transport = ScriptedTransport::new();
        let address = transport.seed(b"1");
        transport.script_fetch_failures([
            FetchFailure::Transient(TransientFailure::Status(500)),
            FetchFailure::Unauthorized,
        ]);

        assert_eq!(
            transport.get_blob(&address).await,
            Err(FetchFailure::Transient(TransientFailure::Status(500)))
        );
        assert_eq!(transport.get_blob(&address).await, Err(FetchFailure::Unauthorized));
        assert_eq!(transport.get_blob(&address).await, Ok(b"1".to_vec()));
        assert_eq!(transport.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_store_failures_are_consumed() {
        let transport = ScriptedTransport::new();
        transport.fail_next_stores(1);
        assert!(transport.put_blob(b"1").await.is_err());
        assert!(transport.put_blob(b"1").await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_fast_store_toggles() {
        let store = FailingFastStore::new();
        store.set("k", "v".to_string()).await.unwrap();
        store.set_fail_reads(true);
        assert!(store.get("k").await.is_err());
        store.set_fail_reads(false);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    proptest! {
        #[test]
        fn prop_payloads_are_never_null(payload in arb_payload()) {
            prop_assert!(!payload.is_null());
        }
    }
}
