/*
    errors.rs - Error types for the sync subsystem

    Defines the failure taxonomy:
    - StoreError: a replica backend failed to read, apply or adopt
    - PersistError: a baseline could not be durably written or read back
    - ConsistencyViolation: a caller/backend contract breach
    - SyncError: what reconciler and engine operations return

    PersistError is never folded into StoreError: after a successful apply
    the live store has moved on while the recorded baseline has not, and the
    caller needs to know that to re-derive the baseline.
*/

use crate::core_sync::model::RecordId;
use crate::core_sync::store::traits::AppliedSet;
use std::time::Duration;
use thiserror::Error;

/// Replica backend failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached or refused the request
    #[error("Replica unavailable: {0}")]
    Unavailable(String),

    /// Read or apply did not complete in time
    #[error("Replica {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Backend rejected the change set as a whole
    #[error("Changes rejected: {0}")]
    Rejected(String),

    /// Some changes landed before the backend failed
    #[error("Partial apply ({} change(s) landed): {reason}", .applied.len())]
    PartialApply { applied: AppliedSet, reason: String },

    /// Assigned identities could not be recorded on the originating replica
    #[error("Identity adoption failed: {0}")]
    Adoption(String),
}

impl StoreError {
    /// Changes that reached the backend despite the failure
    pub fn applied(&self) -> Option<&AppliedSet> {
        match self {
            StoreError::PartialApply { applied, .. } => Some(applied),
            _ => None,
        }
    }
}

/// Baseline persistence failures
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Baseline I/O error: {0}")]
    Io(String),

    #[error("Baseline serialization error: {0}")]
    Serialization(String),

    #[error("Corrupted baseline: {0}")]
    Corrupted(String),
}

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        PersistError::Io(err.to_string())
    }
}

impl From<bincode::Error> for PersistError {
    fn from(err: bincode::Error) -> Self {
        PersistError::Serialization(err.to_string())
    }
}

/// Contract breaches that are fatal to the current cycle
#[derive(Debug, Error)]
pub enum ConsistencyViolation {
    /// Two records in one set share an identity
    #[error("Duplicate identity {0} in one snapshot")]
    DuplicateIdentity(RecordId),

    /// An update or deletion names an identity unknown to both the store and
    /// the baseline
    #[error("Change references unknown identity {0}")]
    UnknownIdentity(RecordId),

    /// An update arrived without an identity
    #[error("Change is missing an identity: {0}")]
    MissingIdentity(String),
}

/// Errors returned by reconciler and engine operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Persist error: {0}")]
    Persist(#[from] PersistError),

    /// Changes landed on the replica but the baseline could not be written.
    /// The live store has diverged from the recorded baseline.
    #[error("Baseline not persisted after {} applied change(s): {source}", .applied.len())]
    BaselineDrift {
        applied: AppliedSet,
        #[source]
        source: PersistError,
    },

    #[error("Consistency violation: {0}")]
    Consistency(#[from] ConsistencyViolation),

    /// Cycle was cancelled before any change was applied
    #[error("Cycle cancelled before applying changes")]
    Cancelled,

    /// Another cycle is already running for this replica pair
    #[error("A sync cycle is already in progress")]
    CycleInProgress,

    /// The apply phase task did not run to completion
    #[error("Apply task failed: {0}")]
    TaskFailed(String),
}

impl SyncError {
    /// Baseline persistence failed; the caller may re-derive the baseline
    /// from a forced full re-read
    pub fn is_persist(&self) -> bool {
        matches!(self, SyncError::Persist(_) | SyncError::BaselineDrift { .. })
    }

    pub fn is_store(&self) -> bool {
        matches!(self, SyncError::Store(_))
    }

    pub fn is_consistency(&self) -> bool {
        matches!(self, SyncError::Consistency(_))
    }

    /// Changes that reached the replica even though the operation failed
    pub fn landed(&self) -> Option<&AppliedSet> {
        match self {
            SyncError::Store(e) => e.applied(),
            SyncError::BaselineDrift { applied, .. } => Some(applied),
            _ => None,
        }
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
