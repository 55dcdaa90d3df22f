//! RipDB Storage - Tiered Persistence
//!
//! A fast key-value store (Redis, LMDB, or in-memory) fronting a durable,
//! content-addressed archive reached over HTTP. Writes land in the fast
//! store immediately and are archived in the background; purged payloads
//! are reconstructed from the archive on read.
//!
//! ```text
//!   set ──► FastStore (pending) ──► background upload ──► FastStore (address)
//!   get ──► FastStore ──hit──► caller
//!                     └─purged─► ArchiveGateway (retry/backoff) ──► caller
//!                                              └─► background repopulate
//! ```

pub mod archive;
pub mod bootstrap;
pub mod fast_store;
pub mod observer;
pub mod orchestrator;

pub use archive::{ArchiveGateway, BlobTransport, FetchFailure, HttpBlobTransport};
pub use bootstrap::{connect, connect_fast_store, DynTier};
pub use fast_store::{
    FastStore, InMemoryFastStore, LmdbFastStore, LmdbStoreError, RedisFastStore, StoreStats,
};
pub use observer::{TierEvent, TierObserver, TracingObserver};
pub use orchestrator::{BackupOutcome, SetOptions, TierOrchestrator};

use serde::{de::DeserializeOwned, Serialize};

/// Values that can be stored through the orchestrator.
pub trait Payload: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Payload for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}
