//! Reporting for background work.
//!
//! Backup uploads and cache repopulation run detached from the call that
//! started them, so their outcomes cannot travel through a return value.
//! They are delivered as [`TierEvent`]s to the orchestrator's
//! [`TierObserver`] instead.

use ripdb_core::{FenceToken, RipError};

use crate::orchestrator::BackupOutcome;

/// Something that happened off the caller's path.
#[derive(Debug, Clone, PartialEq)]
pub enum TierEvent {
    /// A backup task ran to completion.
    BackupFinished {
        key: String,
        token: FenceToken,
        outcome: BackupOutcome,
    },
    /// A backup task gave up; the record stays pending.
    BackupFailed {
        key: String,
        token: FenceToken,
        error: RipError,
    },
    /// A reconstructed payload was written back to the fast store.
    Repopulated { key: String },
    /// The record changed while the archive was being read; nothing written.
    RepopulateSkipped { key: String },
    /// Writing the reconstructed payload back failed.
    RepopulateFailed { key: String, error: RipError },
}

impl TierEvent {
    pub fn key(&self) -> &str {
        match self {
            TierEvent::BackupFinished { key, .. }
            | TierEvent::BackupFailed { key, .. }
            | TierEvent::Repopulated { key }
            | TierEvent::RepopulateSkipped { key }
            | TierEvent::RepopulateFailed { key, .. } => key,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TierEvent::BackupFailed { .. } | TierEvent::RepopulateFailed { .. }
        )
    }
}

/// Sink for background outcomes.
pub trait TierObserver: Send + Sync {
    fn observe(&self, event: &TierEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TierObserver for TracingObserver {
    fn observe(&self, event: &TierEvent) {
        match event {
            TierEvent::BackupFinished {
                key,
                token,
                outcome,
            } => match outcome {
                BackupOutcome::Archived(address) => {
                    tracing::info!(key = %key, token = %token, address = %address, "Backup archived")
                }
                BackupOutcome::Superseded => {
                    tracing::debug!(key = %key, token = %token, "Backup superseded by a newer write")
                }
                other => {
                    tracing::debug!(key = %key, token = %token, outcome = ?other, "Backup finished")
                }
            },
            TierEvent::BackupFailed { key, token, error } => {
                tracing::error!(key = %key, token = %token, error = %error, "Backup failed, record left pending")
            }
            TierEvent::Repopulated { key } => {
                tracing::debug!(key = %key, "Fast store repopulated from archive")
            }
            TierEvent::RepopulateSkipped { key } => {
                tracing::debug!(key = %key, "Repopulation skipped, record changed")
            }
            TierEvent::RepopulateFailed { key, error } => {
                tracing::warn!(key = %key, error = %error, "Repopulation write failed")
            }
        }
    }
}
