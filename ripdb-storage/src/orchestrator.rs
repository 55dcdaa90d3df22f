//! Tier orchestrator.
//!
//! Composes a [`FastStore`] and an [`ArchiveGateway`] into a write-through,
//! read-repair key-value store:
//!
//! - `set` writes a pending envelope to the fast store and archives the
//!   payload in the background.
//! - `get` serves from the fast store and reconstructs purged payloads from
//!   the archive.
//! - `purge` drops a payload from the fast store once a durable copy exists.
//!
//! Each record's `cid` moves only from pending to an address. The background
//! task commits its address only if the record still carries the fence token
//! captured by the `set` that started it.

use std::sync::Arc;

use ripdb_core::{
    decode_envelope, encode_envelope, ContentAddress, Envelope, FenceClock, FenceToken,
    RecordError, RetryPolicy, RipResult,
};
use serde_json::Value;
use tokio_util::task::TaskTracker;

use crate::archive::{ArchiveGateway, BlobTransport};
use crate::fast_store::FastStore;
use crate::observer::{TierEvent, TierObserver, TracingObserver};
use crate::Payload;

/// Result of an archival attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The address was committed to the record.
    Archived(ContentAddress),
    /// The record already pointed at an address; nothing written.
    AlreadyArchived(ContentAddress),
    /// A newer write replaced the record; the uploaded blob is orphaned.
    Superseded,
    /// The key no longer exists.
    Missing,
}

impl BackupOutcome {
    pub fn address(&self) -> Option<&ContentAddress> {
        match self {
            BackupOutcome::Archived(address) | BackupOutcome::AlreadyArchived(address) => {
                Some(address)
            }
            BackupOutcome::Superseded | BackupOutcome::Missing => None,
        }
    }
}

/// Passthrough metadata stored alongside a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub auth_address: Option<Vec<String>>,
    pub encrypted: Option<bool>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth_address(mut self, addresses: Vec<String>) -> Self {
        self.auth_address = Some(addresses);
        self
    }

    pub fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = Some(encrypted);
        self
    }
}

/// Two-tier store over a fast key-value store and a content-addressed archive.
pub struct TierOrchestrator<F: ?Sized, B: ?Sized> {
    fast: Arc<F>,
    archive: Arc<ArchiveGateway<B>>,
    clock: Arc<FenceClock>,
    backup_retry: RetryPolicy,
    observer: Arc<dyn TierObserver>,
    tasks: TaskTracker,
}

impl<F: ?Sized, B: ?Sized> Clone for TierOrchestrator<F, B> {
    fn clone(&self) -> Self {
        Self {
            fast: Arc::clone(&self.fast),
            archive: Arc::clone(&self.archive),
            clock: Arc::clone(&self.clock),
            backup_retry: self.backup_retry.clone(),
            observer: Arc::clone(&self.observer),
            tasks: self.tasks.clone(),
        }
    }
}

impl<F, B> TierOrchestrator<F, B>
where
    F: FastStore + ?Sized + 'static,
    B: BlobTransport + ?Sized + 'static,
{
    /// Create an orchestrator with a single-attempt backup policy and a
    /// [`TracingObserver`].
    pub fn new(fast: Arc<F>, archive: ArchiveGateway<B>) -> Self {
        Self {
            fast,
            archive: Arc::new(archive),
            clock: Arc::new(FenceClock::new()),
            backup_retry: RetryPolicy::single_attempt(),
            observer: Arc::new(TracingObserver),
            tasks: TaskTracker::new(),
        }
    }

    /// Set the retry policy for background uploads.
    pub fn with_backup_retry(mut self, policy: RetryPolicy) -> Self {
        self.backup_retry = policy;
        self
    }

    /// Route background outcomes to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn TierObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Share a fence clock with other orchestrators in the same process.
    pub fn with_clock(mut self, clock: Arc<FenceClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn fast_store(&self) -> &Arc<F> {
        &self.fast
    }

    pub fn archive(&self) -> &ArchiveGateway<B> {
        &self.archive
    }

    /// Number of background tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    // ========================================================================
    // WRITE PATH
    // ========================================================================

    /// Store `value` under `key` and start archiving it.
    ///
    /// Returns once the fast store holds the pending envelope. Archival
    /// happens in the background; its outcome goes to the observer.
    pub async fn set<T: Payload>(&self, key: &str, value: T) -> RipResult<Envelope<T>> {
        self.set_with(key, value, SetOptions::default()).await
    }

    /// [`TierOrchestrator::set`] with passthrough metadata.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn set_with<T: Payload>(
        &self,
        key: &str,
        value: T,
        options: SetOptions,
    ) -> RipResult<Envelope<T>> {
        let payload = serde_json::to_vec(&value).map_err(|e| RecordError::Serialization {
            reason: e.to_string(),
        })?;
        if payload.as_slice() == b"null" {
            return Err(RecordError::NullPayload {
                key: key.to_string(),
            }
            .into());
        }

        let token = self.clock.issue();
        let mut envelope = Envelope::pending(value, token);
        envelope.auth_address = options.auth_address;
        envelope.encrypted = options.encrypted;

        self.fast.set(key, encode_envelope(&envelope)?).await?;
        tracing::debug!(token = %token, "Pending envelope written");

        self.spawn_backup(key.to_string(), payload, token);
        Ok(envelope)
    }

    fn spawn_backup(&self, key: String, payload: Vec<u8>, token: FenceToken) {
        let this = self.clone();
        self.tasks.spawn(async move {
            let event = match this.archive_payload(&key, &payload, Some(token)).await {
                Ok(outcome) => TierEvent::BackupFinished {
                    key,
                    token,
                    outcome,
                },
                Err(error) => TierEvent::BackupFailed { key, token, error },
            };
            this.observer.observe(&event);
        });
    }

    /// Upload `payload`, then commit its address if the record at `key` still
    /// carries `expected`.
    async fn archive_payload(
        &self,
        key: &str,
        payload: &[u8],
        expected: Option<FenceToken>,
    ) -> RipResult<BackupOutcome> {
        let address = self
            .archive
            .store_with_retry(payload, &self.backup_retry)
            .await?;

        let Some(raw) = self.fast.get(key).await? else {
            return Ok(BackupOutcome::Missing);
        };
        let current: Envelope<Value> = decode_envelope(key, &raw)?;

        if current.written_at != expected {
            return Ok(BackupOutcome::Superseded);
        }
        if let Some(existing) = current.address() {
            return Ok(BackupOutcome::AlreadyArchived(existing.clone()));
        }

        self.fast
            .set(key, encode_envelope(&current.archived_at(address.clone()))?)
            .await?;
        Ok(BackupOutcome::Archived(address))
    }

    /// Archive a still-pending record now and wait for the result.
    ///
    /// Uses the record's existing fence token, so a concurrent `set` wins.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn backup_now(&self, key: &str) -> RipResult<BackupOutcome> {
        let Some(raw) = self.fast.get(key).await? else {
            return Ok(BackupOutcome::Missing);
        };
        let envelope: Envelope<Value> = decode_envelope(key, &raw)?;

        if let Some(address) = envelope.address() {
            return Ok(BackupOutcome::AlreadyArchived(address.clone()));
        }
        let Some(data) = envelope.data.as_ref() else {
            return Err(RecordError::CorruptRecord {
                key: key.to_string(),
                reason: "pending record has no payload".to_string(),
            }
            .into());
        };

        let payload = serde_json::to_vec(data).map_err(|e| RecordError::Serialization {
            reason: e.to_string(),
        })?;
        let outcome = self
            .archive_payload(key, &payload, envelope.written_at)
            .await?;
        tracing::info!(outcome = ?outcome, "Manual backup finished");
        Ok(outcome)
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    /// Read the envelope at `key`, reconstructing a purged payload from the
    /// archive.
    ///
    /// Returns `Ok(None)` when the key does not exist.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn get<T: Payload>(&self, key: &str) -> RipResult<Option<Envelope<T>>> {
        let Some(envelope) = self.peek::<T>(key).await? else {
            return Ok(None);
        };
        if !envelope.is_purged() {
            return Ok(Some(envelope));
        }

        let data: T = self.archive.fetch_json(&envelope.archive).await?;
        let next = envelope.with_data(Some(data));
        tracing::debug!("Payload reconstructed from archive");

        self.spawn_repopulate(key.to_string(), next.clone());
        Ok(Some(next))
    }

    /// Read the envelope at `key` from the fast store only.
    pub async fn peek<T: Payload>(&self, key: &str) -> RipResult<Option<Envelope<T>>> {
        match self.fast.get(key).await? {
            Some(raw) => Ok(Some(decode_envelope(key, &raw)?)),
            None => Ok(None),
        }
    }

    fn spawn_repopulate<T: Payload>(&self, key: String, next: Envelope<T>) {
        let this = self.clone();
        self.tasks.spawn(async move {
            let event = match this.repopulate(&key, &next).await {
                Ok(true) => TierEvent::Repopulated { key },
                Ok(false) => TierEvent::RepopulateSkipped { key },
                Err(error) => TierEvent::RepopulateFailed { key, error },
            };
            this.observer.observe(&event);
        });
    }

    /// Write `next` back only if the record is still the purged version it
    /// was reconstructed from.
    async fn repopulate<T: Payload>(&self, key: &str, next: &Envelope<T>) -> RipResult<bool> {
        let Some(raw) = self.fast.get(key).await? else {
            return Ok(false);
        };
        let current: Envelope<Value> = decode_envelope(key, &raw)?;
        if current.written_at != next.written_at
            || current.archive != next.archive
            || !current.is_purged()
        {
            return Ok(false);
        }

        self.fast.set(key, encode_envelope(next)?).await?;
        Ok(true)
    }

    // ========================================================================
    // PURGE
    // ========================================================================

    /// Drop the payload at `key` from the fast store, keeping its address.
    ///
    /// Missing keys are a no-op. Fails with a purge conflict while archival
    /// is still pending.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn purge(&self, key: &str) -> RipResult<()> {
        let Some(raw) = self.fast.get(key).await? else {
            tracing::debug!("Purge of missing key ignored");
            return Ok(());
        };
        let envelope: Envelope<Value> = decode_envelope(key, &raw)?;
        if envelope.is_pending() {
            return Err(RecordError::PurgeConflict {
                key: key.to_string(),
            }
            .into());
        }

        self.fast
            .set(key, encode_envelope(&envelope.purged())?)
            .await?;
        tracing::debug!("Payload purged from fast store");
        Ok(())
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Wait for every background task started so far, including tasks they
    /// start while draining.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Drain background work, then close both stores.
    pub async fn shutdown(&self) -> RipResult<()> {
        self.drain().await;
        self.fast.close().await?;
        self.archive.transport().close().await?;
        tracing::info!("Tier orchestrator shut down");
        Ok(())
    }
}

impl<F: ?Sized, B: ?Sized> std::fmt::Debug for TierOrchestrator<F, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierOrchestrator")
            .field("archive", &self.archive)
            .field("backup_retry", &self.backup_retry)
            .field("in_flight", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::FetchFailure;
    use crate::fast_store::InMemoryFastStore;
    use async_trait::async_trait;
    use ripdb_core::{ArchiveError, RipError};
    use serde_json::json;

    /// Archive that is never reachable.
    struct OfflineArchive;

    #[async_trait]
    impl BlobTransport for OfflineArchive {
        async fn put_blob(&self, _bytes: &[u8]) -> Result<ContentAddress, ArchiveError> {
            Err(ArchiveError::WriteFailed {
                reason: "offline".to_string(),
            })
        }

        async fn get_blob(&self, _address: &ContentAddress) -> Result<Vec<u8>, FetchFailure> {
            Err(FetchFailure::Unauthorized)
        }
    }

    fn orchestrator() -> TierOrchestrator<InMemoryFastStore, OfflineArchive> {
        TierOrchestrator::new(
            Arc::new(InMemoryFastStore::new()),
            ArchiveGateway::new(Arc::new(OfflineArchive), RetryPolicy::default()),
        )
    }

    #[tokio::test]
    async fn test_null_payload_is_rejected() {
        let tier = orchestrator();
        let err = tier.set("k", Value::Null).await.unwrap_err();
        assert_eq!(
            err,
            RipError::from(RecordError::NullPayload {
                key: "k".to_string()
            })
        );
        assert_eq!(tier.fast_store().get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_falsy_payloads_are_not_purged() {
        let tier = orchestrator();
        for (key, value) in [("zero", json!(0)), ("no", json!(false)), ("empty", json!(""))] {
            tier.set(key, value.clone()).await.unwrap();
            let envelope = tier.get::<Value>(key).await.unwrap().unwrap();
            assert_eq!(envelope.data, Some(value));
        }
        tier.drain().await;
    }

    #[tokio::test]
    async fn test_set_with_passthrough_fields() {
        let tier = orchestrator();
        let options = SetOptions::new()
            .with_auth_address(vec!["0xabc".to_string()])
            .with_encrypted(true);
        tier.set_with("k", json!({"a": 1}), options).await.unwrap();
        tier.drain().await;

        let raw = tier.fast_store().get("k").await.unwrap().unwrap();
        let envelope: Envelope<Value> = decode_envelope("k", &raw).unwrap();
        assert_eq!(envelope.auth_address, Some(vec!["0xabc".to_string()]));
        assert_eq!(envelope.encrypted, Some(true));
        assert!(envelope.is_pending());
    }

    #[tokio::test]
    async fn test_purge_missing_key_is_noop() {
        let tier = orchestrator();
        tier.purge("absent").await.unwrap();
        assert_eq!(tier.fast_store().get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_backup_now_on_missing_key() {
        let tier = orchestrator();
        assert_eq!(tier.backup_now("absent").await.unwrap(), BackupOutcome::Missing);
    }

    #[test]
    fn test_backup_outcome_address() {
        let address = ContentAddress::parse("bafk").unwrap();
        assert_eq!(
            BackupOutcome::Archived(address.clone()).address(),
            Some(&address)
        );
        assert_eq!(BackupOutcome::Superseded.address(), None);
    }
}
