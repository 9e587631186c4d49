/*
    traits.rs - Capability interfaces consumed by the sync core

    Concrete backends (IMAP, Maildir, a database) implement `ReplicaStore`;
    baseline persistence implements `BaselineStore`. Both may suspend on I/O.
*/

use crate::core_sync::model::{Record, RecordId, RecordSet};
use crate::core_sync::store::errors::{PersistError, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What happened to one incoming change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyOutcome {
    /// No identity match existed; the record was created
    Created,
    /// Matched an existing record whose content or attributes differed
    Updated,
    /// Matched an existing identical record
    Unchanged,
    /// Tombstone removed the matching record
    Deleted,
    /// Tombstone had nothing to remove
    AlreadyAbsent,
}

/// One change as it landed on a replica
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedChange {
    /// The record as it was sent
    pub source: Record,
    /// Identity on the replica (freshly assigned for pending creations)
    pub identity: RecordId,
    pub outcome: ApplyOutcome,
}

impl AppliedChange {
    pub fn new(source: Record, identity: RecordId, outcome: ApplyOutcome) -> Self {
        Self {
            source,
            identity,
            outcome,
        }
    }

    /// The record both sides now agree on for this identity
    pub fn resulting_record(&self) -> Record {
        match self.outcome {
            ApplyOutcome::Deleted | ApplyOutcome::AlreadyAbsent => Record::tombstone(self.identity),
            _ => self.source.with_identity(self.identity),
        }
    }

    /// Whether the replica had to pick an identity for this change
    pub fn was_assigned(&self) -> bool {
        self.source.is_pending()
    }
}

/// Identity picked by the peer for a record sent without one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityAssignment {
    pub pending: Record,
    pub assigned: RecordId,
}

/// Changes that reached a replica, in application order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppliedSet {
    changes: Vec<AppliedChange>,
}

impl AppliedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: AppliedChange) {
        self.changes.push(change);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AppliedChange> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn count(&self, outcome: ApplyOutcome) -> usize {
        self.changes.iter().filter(|c| c.outcome == outcome).count()
    }

    /// Identities assigned to pending creations
    pub fn assignments(&self) -> Vec<IdentityAssignment> {
        self.changes
            .iter()
            .filter(|c| c.was_assigned())
            .map(|c| IdentityAssignment {
                pending: c.source.clone(),
                assigned: c.identity,
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a AppliedSet {
    type Item = &'a AppliedChange;
    type IntoIter = std::slice::Iter<'a, AppliedChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// A replica backend.
///
/// `apply` must, per incoming record: create it when no identity match
/// exists (assigning an identity to pending records), overwrite content and
/// attributes in place on a match, and delete the match for a tombstone. On
/// partial failure it returns `StoreError::PartialApply` listing what landed.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// Current content snapshot
    async fn read(&self) -> Result<RecordSet, StoreError>;

    /// Apply a set of changes
    async fn apply(&self, changes: RecordSet) -> Result<AppliedSet, StoreError>;

    /// Record identities the peer assigned to records this replica created
    /// without one
    async fn adopt(&self, assignments: &[IdentityAssignment]) -> Result<(), StoreError>;
}

/// Persistence slot for one baseline. Last write wins.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    async fn read(&self) -> Result<RecordSet, PersistError>;

    async fn write(&self, baseline: RecordSet) -> Result<(), PersistError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resulting_record_for_deletion_is_tombstone() {
        let change = AppliedChange::new(
            Record::tombstone(RecordId(5)),
            RecordId(5),
            ApplyOutcome::AlreadyAbsent,
        );
        assert!(change.resulting_record().is_tombstone());
    }

    #[test]
    fn test_assignments_only_cover_pending_creations() {
        let mut applied = AppliedSet::new();
        applied.push(AppliedChange::new(
            Record::pending("new"),
            RecordId(10),
            ApplyOutcome::Created,
        ));
        applied.push(AppliedChange::new(
            Record::with_id(3, "known"),
            RecordId(3),
            ApplyOutcome::Created,
        ));

        let assignments = applied.assignments();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].assigned, RecordId(10));
        assert_eq!(applied.count(ApplyOutcome::Created), 2);
        assert_eq!(
            applied.iter().next().unwrap().resulting_record().identity(),
            Some(RecordId(10))
        );
    }
}
