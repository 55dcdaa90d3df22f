//! The persisted record and its string codec.
//!
//! Every key in the fast store holds exactly one JSON-encoded [`Envelope`]:
//!
//! ```text
//! {"cid":"pending"|"<address>","setAtTimestamp":1700000000000,
//!  "authAddress":["..."],"encrypted":true,"data":<payload>|null}
//! ```
//!
//! `setAtTimestamp`, `authAddress` and `encrypted` are omitted when absent.
//! `data` is always written, as `null` once the payload has been purged.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{ArchiveState, ContentAddress, FenceToken, RecordError};

/// Unit of persistence for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Durable location of the payload, or pending.
    #[serde(rename = "cid")]
    pub archive: ArchiveState,

    /// Fencing token captured when the record was written.
    #[serde(
        rename = "setAtTimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub written_at: Option<FenceToken>,

    /// Opaque passthrough.
    #[serde(rename = "authAddress", default, skip_serializing_if = "Option::is_none")]
    pub auth_address: Option<Vec<String>>,

    /// Opaque passthrough.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,

    /// The payload while resident in the fast tier, `None` once purged.
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// A freshly written record whose archival has not completed.
    pub fn pending(data: T, written_at: FenceToken) -> Self {
        Self {
            archive: ArchiveState::Pending,
            written_at: Some(written_at),
            auth_address: None,
            encrypted: None,
            data: Some(data),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.archive.is_pending()
    }

    pub fn is_purged(&self) -> bool {
        self.data.is_none()
    }

    pub fn address(&self) -> Option<&ContentAddress> {
        self.archive.address()
    }

    /// Same record with a different payload slot.
    pub fn with_data<U>(self, data: Option<U>) -> Envelope<U> {
        Envelope {
            archive: self.archive,
            written_at: self.written_at,
            auth_address: self.auth_address,
            encrypted: self.encrypted,
            data,
        }
    }

    /// Same record pointing at a resolved archive address.
    pub fn archived_at(mut self, address: ContentAddress) -> Self {
        self.archive = ArchiveState::Archived(address);
        self
    }

    /// Same record with the payload dropped.
    pub fn purged(self) -> Self {
        Self { data: None, ..self }
    }
}

/// Encode an envelope into the fast store's string form.
///
/// Fails only if the payload's own `Serialize` implementation fails.
pub fn encode_envelope<T: Serialize>(envelope: &Envelope<T>) -> Result<String, RecordError> {
    serde_json::to_string(envelope).map_err(|e| RecordError::Serialization {
        reason: e.to_string(),
    })
}

/// Decode the string stored at `key` into an envelope.
pub fn decode_envelope<T: DeserializeOwned>(
    key: &str,
    raw: &str,
) -> Result<Envelope<T>, RecordError> {
    serde_json::from_str(raw).map_err(|e| RecordError::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
