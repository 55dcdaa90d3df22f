//! RipDB Core - Envelope Types
//!
//! Pure data structures shared by the storage crate: content addresses, the
//! persisted envelope and its codec, fencing tokens, retry policy, errors and
//! configuration. This crate performs no I/O.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

pub mod config;
pub mod envelope;
pub mod error;
pub mod retry;

pub use config::{
    ArchiveConfig, FastStoreConfig, RipConfig, DEFAULT_ARCHIVE_API_URL,
    DEFAULT_GATEWAY_BASE_URL,
};
pub use envelope::{decode_envelope, encode_envelope, Envelope};
pub use error::{
    ArchiveError, ConfigError, FastStoreError, RecordError, RipError, RipResult,
    TransientFailure,
};
pub use retry::RetryPolicy;

/// Wire value of the `cid` field while archival is outstanding.
pub const PENDING_SENTINEL: &str = "pending";

// ============================================================================
// CONTENT ADDRESSES
// ============================================================================

/// Opaque handle returned by the archive for a stored blob.
///
/// Never interpreted, only compared and stored. It is embedded in gateway URL
/// paths, so it may not be empty, contain whitespace or path/query delimiters,
/// or collide with the pending sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn parse(value: impl Into<String>) -> Result<Self, RecordError> {
        let value = value.into();
        let reason = if value.is_empty() {
            Some("address is empty")
        } else if value == PENDING_SENTINEL {
            Some("address collides with the pending sentinel")
        } else if value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'))
        {
            Some("address contains a path delimiter or whitespace")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(RecordError::InvalidAddress {
                value,
                reason: reason.to_string(),
            }),
            None => Ok(Self(value)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the durable copy of a record lives.
///
/// Transitions only `Pending -> Archived`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArchiveState {
    /// Archival has been started but not confirmed.
    Pending,
    /// The payload is durable at this address.
    Archived(ContentAddress),
}

impl ArchiveState {
    pub fn is_pending(&self) -> bool {
        matches!(self, ArchiveState::Pending)
    }

    pub fn address(&self) -> Option<&ContentAddress> {
        match self {
            ArchiveState::Pending => None,
            ArchiveState::Archived(address) => Some(address),
        }
    }
}

impl From<ContentAddress> for ArchiveState {
    fn from(address: ContentAddress) -> Self {
        ArchiveState::Archived(address)
    }
}

impl fmt::Display for ArchiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveState::Pending => f.write_str(PENDING_SENTINEL),
            ArchiveState::Archived(address) => address.fmt(f),
        }
    }
}

impl Serialize for ArchiveState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ArchiveState::Pending => serializer.serialize_str(PENDING_SENTINEL),
            ArchiveState::Archived(address) => serializer.serialize_str(address.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for ArchiveState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == PENDING_SENTINEL {
            return Ok(ArchiveState::Pending);
        }
        ContentAddress::parse(raw)
            .map(ArchiveState::Archived)
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// FENCING TOKENS
// ============================================================================

/// Logical write time in Unix milliseconds, captured once per write.
///
/// Serialized as the bare integer in `setAtTimestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FenceToken(i64);

impl FenceToken {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for FenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Issues fencing tokens that are strictly increasing within one process.
///
/// Tokens follow wall-clock milliseconds but never repeat: two writes in the
/// same millisecond get consecutive values. Uniqueness across processes is
/// not guaranteed.
#[derive(Debug, Default)]
pub struct FenceClock {
    last: AtomicI64,
}

impl FenceClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for a write happening now.
    pub fn issue(&self) -> FenceToken {
        self.issue_at(Utc::now().timestamp_millis())
    }

    /// Issue a token given the current wall-clock time in milliseconds.
    pub fn issue_at(&self, now_millis: i64) -> FenceToken {
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now_millis.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        FenceToken(now_millis.max(previous.saturating_add(1)))
    }
}
