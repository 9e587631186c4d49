/*
    Shared fixtures: an engine over two in-memory replicas with handles to
    every store and baseline slot.
*/

use crate::config::SyncConfig;
use crate::core_sync::model::{Record, RecordSet};
use crate::core_sync::store::{BaselineStore, MemoryBaselineStore, MemoryReplicaStore};
use crate::core_sync::sync::{Side, SideReconciler, SyncEngine};

pub struct Pair {
    pub engine: SyncEngine,
    pub left: MemoryReplicaStore,
    pub right: MemoryReplicaStore,
    pub left_own: MemoryBaselineStore,
    pub left_peer: MemoryBaselineStore,
    pub right_own: MemoryBaselineStore,
    pub right_peer: MemoryBaselineStore,
}

impl Pair {
    /// Two replicas that have never synced
    pub fn new(left: Vec<Record>, right: Vec<Record>) -> Self {
        Self::build(left, right, RecordSet::new(), SyncConfig::default())
    }

    /// Two replicas whose baselines all hold `agreed`, as after an earlier
    /// successful cycle
    pub fn with_baseline(left: Vec<Record>, right: Vec<Record>, agreed: Vec<Record>) -> Self {
        let agreed = RecordSet::from_records(agreed).unwrap();
        Self::build(left, right, agreed, SyncConfig::default())
    }

    pub fn with_config(left: Vec<Record>, right: Vec<Record>, config: SyncConfig) -> Self {
        Self::build(left, right, RecordSet::new(), config)
    }

    fn build(left: Vec<Record>, right: Vec<Record>, agreed: RecordSet, config: SyncConfig) -> Self {
        // left assigns odd identities, right even ones
        let left = MemoryReplicaStore::with_records(left)
            .unwrap()
            .with_identity_space(1, 2);
        let right = MemoryReplicaStore::with_records(right)
            .unwrap()
            .with_identity_space(0, 2);
        let left_own = MemoryBaselineStore::with_baseline(agreed.clone());
        let left_peer = MemoryBaselineStore::with_baseline(agreed.clone());
        let right_own = MemoryBaselineStore::with_baseline(agreed.clone());
        let right_peer = MemoryBaselineStore::with_baseline(agreed);

        let engine = SyncEngine::new(
            SideReconciler::new(Side::Left, left.clone(), left_own.clone(), left_peer.clone()),
            SideReconciler::new(Side::Right, right.clone(), right_own.clone(), right_peer.clone()),
            config,
        );

        Self {
            engine,
            left,
            right,
            left_own,
            left_peer,
            right_own,
            right_peer,
        }
    }

    pub async fn converged(&self) -> bool {
        self.left.snapshot().await.same_contents(&self.right.snapshot().await)
    }

    /// Tombstones across all four baseline slots
    pub async fn tombstone_count(&self) -> usize {
        let mut count = 0;
        for slot in [&self.left_own, &self.left_peer, &self.right_own, &self.right_peer] {
            count += slot.read().await.unwrap().tombstones().count();
        }
        count
    }
}

/// Records 1..=n with content "body<n>"
pub fn mailbox(ids: impl IntoIterator<Item = u64>) -> Vec<Record> {
    ids.into_iter()
        .map(|id| Record::with_id(id, format!("body{}", id)))
        .collect()
}
