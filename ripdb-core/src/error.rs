//! Error types for RipDB operations

use crate::ContentAddress;
use std::time::Duration;
use thiserror::Error;

/// Fast store (hot tier) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FastStoreError {
    #[error("Fast store read failed for key {key}: {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Fast store write failed for key {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Fast store connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Fast store lock poisoned")]
    LockPoisoned,
}

/// A single failed archive read that is worth retrying.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransientFailure {
    #[error("network error: {0}")]
    Network(String),

    #[error("gateway responded with status {0}")]
    Status(u16),

    #[error("malformed body: {0}")]
    MalformedBody(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// Archive (cold tier) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("Archive write failed: {reason}")]
    WriteFailed { reason: String },

    #[error("Cannot fetch from archive, backup is pending")]
    PendingArchive,

    #[error("Archive gateway denied access to {address}")]
    Unauthorized { address: ContentAddress },

    #[error("Archive fetch of {address} failed after {attempts} attempts: {last_error}")]
    FetchExhausted {
        address: ContentAddress,
        attempts: u32,
        #[source]
        last_error: TransientFailure,
    },
}

/// Errors about the persisted record itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Corrupt record at key {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Cannot purge key {key} before archive backup is complete")]
    PurgeConflict { key: String },

    #[error("Payload for key {key} serializes to null")]
    NullPayload { key: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Invalid content address {value:?}: {reason}")]
    InvalidAddress { value: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all RipDB errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RipError {
    #[error("Fast store error: {0}")]
    FastStore(#[from] FastStoreError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl RipError {
    /// No durable copy exists yet; retry later.
    pub fn is_pending_archive(&self) -> bool {
        matches!(self, RipError::Archive(ArchiveError::PendingArchive))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RipError::Archive(ArchiveError::Unauthorized { .. }))
    }

    pub fn is_fetch_exhausted(&self) -> bool {
        matches!(self, RipError::Archive(ArchiveError::FetchExhausted { .. }))
    }

    pub fn is_purge_conflict(&self) -> bool {
        matches!(self, RipError::Record(RecordError::PurgeConflict { .. }))
    }

    pub fn is_corrupt_record(&self) -> bool {
        matches!(self, RipError::Record(RecordError::CorruptRecord { .. }))
    }
}

/// Result type alias for RipDB operations.
pub type RipResult<T> = Result<T, RipError>;

// =============================================================================
// TESTS
// =============================================================================
