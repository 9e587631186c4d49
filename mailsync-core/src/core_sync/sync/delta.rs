/*
    delta.rs - Changes computed against a baseline

    A delta is what one side sends to the other: creations, updates and
    deletions since its own baseline. It also carries the tombstones that
    were already settled on both baseline slots when it was computed, which
    become prunable once the cycle is acknowledged.
*/

use crate::core_sync::model::{Record, RecordId, RecordSet};
use crate::core_sync::store::errors::ConsistencyViolation;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// One change in a delta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Change {
    /// Not present in the sender's baseline (identity may still be pending)
    Create(Record),
    /// Present in the baseline with different content or attributes
    Update(Record),
    /// Present in the baseline, gone from the sender's store
    Delete(RecordId),
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Create(_) => ChangeKind::Create,
            Change::Update(_) => ChangeKind::Update,
            Change::Delete(_) => ChangeKind::Delete,
        }
    }

    pub fn identity(&self) -> Option<RecordId> {
        match self {
            Change::Create(r) | Change::Update(r) => r.identity(),
            Change::Delete(id) => Some(*id),
        }
    }

    /// The record handed to the replica; deletions become tombstones
    pub fn to_record(&self) -> Record {
        match self {
            Change::Create(r) | Change::Update(r) => r.clone(),
            Change::Delete(id) => Record::tombstone(*id),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Create(r) => write!(f, "+{}", r),
            Change::Update(r) => write!(f, "~{}", r),
            Change::Delete(id) => write!(f, "-{}", id),
        }
    }
}

/// Outgoing changes of one side for one cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    changes: Vec<Change>,
    settled_tombstones: Vec<RecordId>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// No changes to send. Settled tombstones do not count.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn creations(&self) -> usize {
        self.count(ChangeKind::Create)
    }

    pub fn updates(&self) -> usize {
        self.count(ChangeKind::Update)
    }

    pub fn deletions(&self) -> usize {
        self.count(ChangeKind::Delete)
    }

    fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind() == kind).count()
    }

    /// Change for an identity, if any
    pub fn get(&self, id: RecordId) -> Option<&Change> {
        self.changes.iter().find(|c| c.identity() == Some(id))
    }

    /// Remove and return the change for an identity
    pub fn take(&mut self, id: RecordId) -> Option<Change> {
        let pos = self.changes.iter().position(|c| c.identity() == Some(id))?;
        Some(self.changes.remove(pos))
    }

    pub fn settled_tombstones(&self) -> &[RecordId] {
        &self.settled_tombstones
    }

    pub fn set_settled_tombstones(&mut self, ids: Vec<RecordId>) {
        self.settled_tombstones = ids;
    }

    /// Records to hand to `ReplicaStore::apply`
    pub fn to_record_set(&self) -> Result<RecordSet, ConsistencyViolation> {
        RecordSet::from_records(self.changes.iter().map(Change::to_record))
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.changes.iter().map(Change::to_string).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
