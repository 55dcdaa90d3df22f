//! Archive (cold tier) access.
//!
//! [`BlobTransport`] is the raw contract with the content-addressed store:
//! upload bytes, download bytes. [`ArchiveGateway`] layers the retry policy,
//! the pending-sentinel guard and JSON decoding on top of it.

use async_trait::async_trait;
use ripdb_core::{ArchiveError, ContentAddress, TransientFailure};

pub mod gateway;
pub mod http;

pub use self::gateway::ArchiveGateway;
pub use self::http::HttpBlobTransport;

/// Outcome of a single failed download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The gateway refused access. Never retried.
    Unauthorized,
    /// Anything worth another attempt.
    Transient(TransientFailure),
}

impl From<TransientFailure> for FetchFailure {
    fn from(failure: TransientFailure) -> Self {
        FetchFailure::Transient(failure)
    }
}

/// Raw content-addressed blob store.
#[async_trait]
pub trait BlobTransport: Send + Sync {
    /// Upload `bytes` and return the address the store assigned.
    async fn put_blob(&self, bytes: &[u8]) -> Result<ContentAddress, ArchiveError>;

    /// Download the blob at `address`. One attempt, no retries.
    async fn get_blob(&self, address: &ContentAddress) -> Result<Vec<u8>, FetchFailure>;

    /// Release resources.
    async fn close(&self) -> Result<(), ArchiveError> {
        Ok(())
    }
}
