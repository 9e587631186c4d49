/*
    memory_store.rs - In-memory replica and baseline stores

    Used by tests and the CLI demo. Clones share state, so a test can keep a
    handle to mutate a replica while a reconciler owns another. Both support
    fault injection for exercising failure paths.
*/

use crate::core_sync::model::{Record, RecordId, RecordSet};
use crate::core_sync::store::errors::{ConsistencyViolation, PersistError, StoreError};
use crate::core_sync::store::traits::{
    AppliedChange, AppliedSet, ApplyOutcome, BaselineStore, IdentityAssignment, ReplicaStore,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Faults {
    fail_next_read: Option<String>,
    fail_next_apply: Option<String>,
    fail_after: Option<(usize, String)>,
    fail_next_adopt: Option<String>,
    apply_delay: Option<Duration>,
}

/// Identities of the form `offset + k * stride`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdentitySpace {
    offset: u64,
    stride: u64,
}

impl Default for IdentitySpace {
    fn default() -> Self {
        Self { offset: 0, stride: 1 }
    }
}

#[derive(Debug, Default)]
struct ReplicaState {
    records: RecordSet,
    next_id: u64,
    faults: Faults,
}

impl ReplicaState {
    fn bump(&mut self, id: RecordId) {
        self.next_id = self.next_id.max(id.as_u64().saturating_add(1));
    }

    /// Lowest unused identity inside `space`
    fn allocate(&mut self, space: IdentitySpace) -> RecordId {
        let stride = space.stride.max(1);
        let candidate = self.next_id.max(1);
        let target = space.offset % stride;
        let gap = (target + stride - candidate % stride) % stride;
        let id = RecordId(candidate.saturating_add(gap));
        self.bump(id);
        id
    }
}

/// In-memory replica. Identities are never reused once handed out.
#[derive(Debug, Clone, Default)]
pub struct MemoryReplicaStore {
    state: Arc<RwLock<ReplicaState>>,
    space: IdentitySpace,
}

impl MemoryReplicaStore {
    /// Create an empty replica
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a replica pre-filled with records
    pub fn with_records(
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Self, ConsistencyViolation> {
        let records = RecordSet::from_records(records)?;
        let next_id = records
            .ids()
            .iter()
            .map(|id| id.as_u64().saturating_add(1))
            .max()
            .unwrap_or(1);
        Ok(Self {
            state: Arc::new(RwLock::new(ReplicaState {
                records,
                next_id,
                faults: Faults::default(),
            })),
            space: IdentitySpace::default(),
        })
    }

    /// Hand out identities only from `offset + k * stride`. Two replicas
    /// with distinct offsets never assign the same identity. Applies to this
    /// handle and clones taken from it afterwards.
    pub fn with_identity_space(self, offset: u64, stride: u64) -> Self {
        Self {
            space: IdentitySpace {
                offset,
                stride: stride.max(1),
            },
            ..self
        }
    }

    /// Current content, bypassing fault injection
    pub async fn snapshot(&self) -> RecordSet {
        self.state.read().await.records.clone()
    }

    /// Add a record as if created locally
    pub async fn insert(&self, record: Record) -> Result<(), ConsistencyViolation> {
        let mut state = self.state.write().await;
        if let Some(id) = record.identity() {
            state.bump(id);
        }
        state.records.insert(record)
    }

    /// Edit a record locally. Returns false if the identity is unknown.
    pub async fn modify(&self, id: RecordId, edit: impl FnOnce(&mut Record)) -> bool {
        let mut state = self.state.write().await;
        match state.records.get_mut(id) {
            Some(record) => {
                edit(record);
                true
            }
            None => false,
        }
    }

    /// Delete a record locally
    pub async fn delete(&self, id: RecordId) -> Option<Record> {
        self.state.write().await.records.remove(id)
    }

    pub async fn fail_next_read(&self, reason: impl Into<String>) {
        self.state.write().await.faults.fail_next_read = Some(reason.into());
    }

    /// Reject the next apply before any change lands
    pub async fn fail_next_apply(&self, reason: impl Into<String>) {
        self.state.write().await.faults.fail_next_apply = Some(reason.into());
    }

    /// Let the next apply land `landed` changes, then fail
    pub async fn fail_after(&self, landed: usize, reason: impl Into<String>) {
        self.state.write().await.faults.fail_after = Some((landed, reason.into()));
    }

    pub async fn fail_next_adopt(&self, reason: impl Into<String>) {
        self.state.write().await.faults.fail_next_adopt = Some(reason.into());
    }

    /// Sleep before every apply (simulates a slow backend)
    pub async fn set_apply_delay(&self, delay: Option<Duration>) {
        self.state.write().await.faults.apply_delay = delay;
    }

    fn apply_one(
        state: &mut ReplicaState,
        space: IdentitySpace,
        record: Record,
    ) -> Result<AppliedChange, StoreError> {
        let change = match (record.identity(), record.is_tombstone()) {
            (Some(id), true) => {
                let outcome = match state.records.remove(id) {
                    Some(_) => ApplyOutcome::Deleted,
                    None => ApplyOutcome::AlreadyAbsent,
                };
                AppliedChange::new(record, id, outcome)
            }
            (Some(id), false) => {
                let outcome = match state.records.get(id) {
                    Some(existing) if existing.identical(&record) => ApplyOutcome::Unchanged,
                    Some(_) => ApplyOutcome::Updated,
                    None => ApplyOutcome::Created,
                };
                if outcome != ApplyOutcome::Unchanged {
                    state.records.upsert(record.clone());
                    state.bump(id);
                }
                AppliedChange::new(record, id, outcome)
            }
            (None, false) => {
                let id = state.allocate(space);
                state.records.upsert(record.with_identity(id));
                AppliedChange::new(record, id, ApplyOutcome::Created)
            }
            (None, true) => {
                return Err(StoreError::Rejected(
                    "tombstone without identity".to_string(),
                ))
            }
        };
        Ok(change)
    }
}

#[async_trait]
impl ReplicaStore for MemoryReplicaStore {
    async fn read(&self) -> Result<RecordSet, StoreError> {
        let mut state = self.state.write().await;
        if let Some(reason) = state.faults.fail_next_read.take() {
            return Err(StoreError::Unavailable(reason));
        }
        Ok(state.records.clone())
    }

    async fn apply(&self, changes: RecordSet) -> Result<AppliedSet, StoreError> {
        let delay = self.state.read().await.faults.apply_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if let Some(reason) = state.faults.fail_next_apply.take() {
            return Err(StoreError::Unavailable(reason));
        }
        let fail_after = state.faults.fail_after.take();

        // fresh identities must not collide with ones carried later in the batch
        for id in changes.ids() {
            state.bump(id);
        }

        let mut applied = AppliedSet::new();
        for (i, record) in changes.into_iter().enumerate() {
            if let Some((landed, reason)) = &fail_after {
                if i == *landed {
                    return Err(StoreError::PartialApply {
                        applied,
                        reason: reason.clone(),
                    });
                }
            }
            match Self::apply_one(&mut state, self.space, record) {
                Ok(change) => applied.push(change),
                Err(StoreError::Rejected(reason)) if !applied.is_empty() => {
                    return Err(StoreError::PartialApply { applied, reason });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(applied)
    }

    async fn adopt(&self, assignments: &[IdentityAssignment]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(reason) = state.faults.fail_next_adopt.take() {
            return Err(StoreError::Adoption(reason));
        }

        let mut records = state.records.clone().into_records();
        for assignment in assignments {
            let slot = records
                .iter()
                .position(|r| r.is_pending() && r.same_payload(&assignment.pending));
            match slot {
                Some(pos) => records[pos] = records[pos].with_identity(assignment.assigned),
                None => debug!(
                    assigned = %assignment.assigned,
                    "pending record no longer present, skipping adoption"
                ),
            }
        }

        // on a collision the replica keeps its pre-adoption content
        let adopted = RecordSet::from_records(records)
            .map_err(|e| StoreError::Adoption(e.to_string()))?;
        state.records = adopted;
        for assignment in assignments {
            state.bump(assignment.assigned);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BaselineSlot {
    baseline: RecordSet,
    writes: usize,
    fail_next_write: Option<String>,
}

/// In-memory baseline slot
#[derive(Debug, Clone, Default)]
pub struct MemoryBaselineStore {
    slot: Arc<RwLock<BaselineSlot>>,
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previously agreed baseline
    pub fn with_baseline(baseline: RecordSet) -> Self {
        Self {
            slot: Arc::new(RwLock::new(BaselineSlot {
                baseline,
                ..Default::default()
            })),
        }
    }

    /// Number of successful writes so far
    pub async fn writes(&self) -> usize {
        self.slot.read().await.writes
    }

    pub async fn fail_next_write(&self, reason: impl Into<String>) {
        self.slot.write().await.fail_next_write = Some(reason.into());
    }
}

#[async_trait]
impl BaselineStore for MemoryBaselineStore {
    async fn read(&self) -> Result<RecordSet, PersistError> {
        Ok(self.slot.read().await.baseline.clone())
    }

    async fn write(&self, baseline: RecordSet) -> Result<(), PersistError> {
        let mut slot = self.slot.write().await;
        if let Some(reason) = slot.fail_next_write.take() {
            return Err(PersistError::Io(reason));
        }
        slot.baseline = baseline;
        slot.writes += 1;
        Ok(())
    }
}
