//! Retrying access to the archive.
//!
//! Reads go through a bounded exponential backoff: each attempt runs under
//! its own timeout, a 403 ends the loop immediately, and every other failure
//! (transport error, non-2xx status, timeout, undecodable body) is retried
//! until the policy's attempt budget is spent.

use std::sync::Arc;

use ripdb_core::{ArchiveError, ArchiveState, ContentAddress, RetryPolicy, TransientFailure};
use serde::de::DeserializeOwned;

use super::{BlobTransport, FetchFailure};

/// Retry engine in front of a [`BlobTransport`].
pub struct ArchiveGateway<B: ?Sized> {
    transport: Arc<B>,
    fetch_retry: RetryPolicy,
}

impl<B: BlobTransport + ?Sized> ArchiveGateway<B> {
    pub fn new(transport: Arc<B>, fetch_retry: RetryPolicy) -> Self {
        Self {
            transport,
            fetch_retry,
        }
    }

    pub fn transport(&self) -> &Arc<B> {
        &self.transport
    }

    /// Policy applied to reads when no explicit count is given.
    pub fn fetch_retry(&self) -> &RetryPolicy {
        &self.fetch_retry
    }

    /// Upload `bytes` once. Failures are returned as-is.
    pub async fn store(&self, bytes: &[u8]) -> Result<ContentAddress, ArchiveError> {
        self.transport.put_blob(bytes).await
    }

    /// Upload `bytes`, retrying write failures according to `policy`.
    pub async fn store_with_retry(
        &self,
        bytes: &[u8],
        policy: &RetryPolicy,
    ) -> Result<ContentAddress, ArchiveError> {
        let attempts = policy.attempts();
        let mut attempt = 1;

        loop {
            let outcome = match tokio::time::timeout(
                policy.attempt_timeout,
                self.transport.put_blob(bytes),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ArchiveError::WriteFailed {
                    reason: format!("upload timed out after {:?}", policy.attempt_timeout),
                }),
            };

            match outcome {
                Ok(address) => return Ok(address),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let delay = policy.backoff_after(attempt);
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Archive upload failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Download the raw blob behind `state` using the default read policy.
    pub async fn fetch(&self, state: &ArchiveState) -> Result<Vec<u8>, ArchiveError> {
        let address = require_address(state)?;
        self.fetch_with(address, &self.fetch_retry, Ok).await
    }

    /// Download and decode the JSON payload behind `state`.
    pub async fn fetch_json<T>(&self, state: &ArchiveState) -> Result<T, ArchiveError>
    where
        T: DeserializeOwned + Send,
    {
        let address = require_address(state)?;
        self.fetch_with(address, &self.fetch_retry, decode_json).await
    }

    /// Same as [`ArchiveGateway::fetch_json`] with an explicit attempt count.
    pub async fn fetch_json_with_retries<T>(
        &self,
        state: &ArchiveState,
        retries: u32,
    ) -> Result<T, ArchiveError>
    where
        T: DeserializeOwned + Send,
    {
        let address = require_address(state)?;
        let policy = self.fetch_retry.clone().with_max_attempts(retries);
        self.fetch_with(address, &policy, decode_json).await
    }

    async fn fetch_with<T, D>(
        &self,
        address: &ContentAddress,
        policy: &RetryPolicy,
        decode: D,
    ) -> Result<T, ArchiveError>
    where
        T: Send,
        D: Fn(Vec<u8>) -> Result<T, TransientFailure> + Send + Sync,
    {
        let attempts = policy.attempts();
        let mut attempt = 1;

        loop {
            let outcome =
                match tokio::time::timeout(policy.attempt_timeout, self.transport.get_blob(address))
                    .await
                {
                    Ok(Ok(bytes)) => decode(bytes).map_err(FetchFailure::Transient),
                    Ok(Err(failure)) => Err(failure),
                    Err(_) => Err(FetchFailure::Transient(TransientFailure::Timeout(
                        policy.attempt_timeout,
                    ))),
                };

            match outcome {
                Ok(value) => {
                    tracing::debug!(address = %address, attempt = attempt, "Archive fetch succeeded");
                    return Ok(value);
                }
                Err(FetchFailure::Unauthorized) => {
                    tracing::warn!(address = %address, "Archive gateway denied access");
                    return Err(ArchiveError::Unauthorized {
                        address: address.clone(),
                    });
                }
                Err(FetchFailure::Transient(failure)) if attempt >= attempts => {
                    tracing::error!(
                        address = %address,
                        attempts = attempts,
                        error = %failure,
                        "Archive fetch exhausted all attempts"
                    );
                    return Err(ArchiveError::FetchExhausted {
                        address: address.clone(),
                        attempts,
                        last_error: failure,
                    });
                }
                Err(FetchFailure::Transient(failure)) => {
                    let delay = policy.backoff_after(attempt);
                    tracing::warn!(
                        address = %address,
                        attempt = attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Archive fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn require_address(state: &ArchiveState) -> Result<&ContentAddress, ArchiveError> {
    state.address().ok_or(ArchiveError::PendingArchive)
}

fn decode_json<T: DeserializeOwned>(bytes: Vec<u8>) -> Result<T, TransientFailure> {
    serde_json::from_slice(&bytes).map_err(|e| TransientFailure::MalformedBody(e.to_string()))
}

impl<B: ?Sized> std::fmt::Debug for ArchiveGateway<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveGateway")
            .field("fetch_retry", &self.fetch_retry)
            .finish_non_exhaustive()
    }
}
