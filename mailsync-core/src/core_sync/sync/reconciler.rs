/*
    reconciler.rs - One side of a replica pair

    A SideReconciler owns one replica and two baseline slots:
    - own:  this side's last agreed state, the reference for its deltas
    - peer: mirror of the peer's agreed state

    Flow per cycle:
    1. compute_delta    - pure read: store snapshot vs own baseline
    2. apply_incoming   - apply the peer's delta, absorb what landed into
                          both slots
    3. acknowledge      - after the peer applied our delta, adopt assigned
                          identities, absorb what landed, prune tombstones
                          settled on both slots

    Local changes the peer never acknowledged are never folded into the own
    baseline, so they are re-derived by the next compute_delta.
*/

use super::delta::{Change, Delta};
use crate::core_sync::model::{Record, RecordId, RecordSet};
use crate::core_sync::store::errors::{
    ConsistencyViolation, PersistError, StoreError, SyncError, SyncResult,
};
use crate::core_sync::store::traits::{AppliedSet, BaselineStore, ReplicaStore};
use crate::core_sync::store::FileBaselineStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Which replica of the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn peer(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Store and baseline contents of one side, for test harnesses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideSnapshot {
    pub side: Side,
    pub store: RecordSet,
    pub own_baseline: RecordSet,
    pub peer_baseline: RecordSet,
}

/// Reconciler for one side of a replica pair
pub struct SideReconciler {
    side: Side,
    store: Arc<dyn ReplicaStore>,
    own: Arc<dyn BaselineStore>,
    peer: Arc<dyn BaselineStore>,
    read_timeout: Duration,
    apply_timeout: Duration,
}

impl SideReconciler {
    pub fn new(
        side: Side,
        store: impl ReplicaStore + 'static,
        own: impl BaselineStore + 'static,
        peer: impl BaselineStore + 'static,
    ) -> Self {
        Self {
            side,
            store: Arc::new(store),
            own: Arc::new(own),
            peer: Arc::new(peer),
            read_timeout: Duration::from_secs(30),
            apply_timeout: Duration::from_secs(60),
        }
    }

    /// Reconciler whose baselines live in `<state_dir>/<side>.own.baseline`
    /// and `<state_dir>/<side>.peer.baseline`
    pub fn with_file_baselines(
        side: Side,
        store: impl ReplicaStore + 'static,
        state_dir: impl AsRef<Path>,
    ) -> Self {
        let dir = state_dir.as_ref();
        Self::new(
            side,
            store,
            FileBaselineStore::in_dir(dir, &format!("{}.own", side)),
            FileBaselineStore::in_dir(dir, &format!("{}.peer", side)),
        )
    }

    pub fn with_timeouts(mut self, read_timeout: Duration, apply_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self.apply_timeout = apply_timeout;
        self
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Compute outgoing changes: current store snapshot against the own
    /// baseline. Reads only.
    pub async fn compute_delta(&self) -> SyncResult<Delta> {
        let snapshot = self.read_store().await?;
        let (own, peer) = tokio::try_join!(self.own.read(), self.peer.read())?;

        let mut delta = Delta::new();
        for record in snapshot.iter() {
            let Some(id) = record.identity() else {
                delta.push(Change::Create(record.clone()));
                continue;
            };
            match own.get(id) {
                None => delta.push(Change::Create(record.clone())),
                Some(base) if base.is_tombstone() => {
                    if peer.is_tombstoned(id) {
                        warn!(side = %self.side, id = %id, "deleted record reported again by store, ignoring");
                    } else {
                        delta.push(Change::Create(record.clone()));
                    }
                }
                Some(base) if !base.identical(record) => delta.push(Change::Update(record.clone())),
                Some(_) => {}
            }
        }

        for base in own.active() {
            if let Some(id) = base.identity() {
                if !snapshot.contains_id(id) {
                    delta.push(Change::Delete(id));
                }
            }
        }

        let settled: Vec<RecordId> = own
            .tombstones()
            .filter_map(Record::identity)
            .filter(|id| peer.is_tombstoned(*id))
            .collect();
        delta.set_settled_tombstones(settled);

        debug!(
            side = %self.side,
            creations = delta.creations(),
            updates = delta.updates(),
            deletions = delta.deletions(),
            "computed delta"
        );
        Ok(delta)
    }

    /// Apply the peer's delta to this side's replica. Both baseline slots
    /// absorb what landed, including the landed part of a partial apply.
    /// Changes that did not land never reach the baselines.
    pub async fn apply_incoming(&self, delta: &Delta) -> SyncResult<AppliedSet> {
        if delta.is_empty() {
            return Ok(AppliedSet::new());
        }

        let snapshot = self.read_store().await?;
        let (mut own, mut peer) = tokio::try_join!(self.own.read(), self.peer.read())?;
        self.validate_incoming(delta, &snapshot, &own)?;

        let changes = delta.to_record_set()?;
        let applied = match self
            .timed("apply", self.apply_timeout, self.store.apply(changes))
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                warn!(side = %self.side, error = %e, "incoming delta not applied");
                if let Some(landed) = e.applied().filter(|landed| !landed.is_empty()) {
                    let landed = landed.clone();
                    absorb(&mut own, &landed);
                    absorb(&mut peer, &landed);
                    if let Err(source) = self.persist(own, peer).await {
                        error!(side = %self.side, error = %source, "partially applied changes but baseline was not persisted");
                        return Err(SyncError::BaselineDrift { applied: landed, source });
                    }
                    debug!(side = %self.side, landed = landed.len(), "absorbed partially applied delta");
                }
                return Err(SyncError::Store(e));
            }
        };

        absorb(&mut own, &applied);
        absorb(&mut peer, &applied);
        if let Err(source) = self.persist(own, peer).await {
            error!(side = %self.side, error = %source, "applied changes but baseline was not persisted");
            return Err(SyncError::BaselineDrift { applied, source });
        }

        debug!(side = %self.side, applied = applied.len(), "incoming delta applied");
        Ok(applied)
    }

    /// Record that the peer applied (part of) our delta: adopt identities it
    /// assigned, absorb what landed into both slots, prune settled tombstones.
    pub async fn acknowledge(&self, sent: &Delta, peer_applied: &AppliedSet) -> SyncResult<()> {
        let assignments = peer_applied.assignments();
        let adoption = if assignments.is_empty() {
            Ok(())
        } else {
            self.timed("adopt", self.apply_timeout, self.store.adopt(&assignments))
                .await
        };

        let (mut own, mut peer) = tokio::try_join!(self.own.read(), self.peer.read())?;
        absorb(&mut own, peer_applied);
        absorb(&mut peer, peer_applied);

        let mut pruned = 0;
        for id in sent.settled_tombstones() {
            if own.is_tombstoned(*id) && peer.is_tombstoned(*id) {
                own.remove(*id);
                peer.remove(*id);
                pruned += 1;
            }
        }

        if !peer_applied.is_empty() || pruned > 0 {
            self.persist(own, peer).await.map_err(|e| {
                error!(side = %self.side, error = %e, "acknowledged changes but baseline was not persisted");
                SyncError::Persist(e)
            })?;
        }

        debug!(
            side = %self.side,
            acknowledged = peer_applied.len(),
            assigned = assignments.len(),
            pruned,
            "delta acknowledged"
        );

        // identities are recorded in the baseline even when adoption failed
        adoption.map_err(|e| {
            warn!(side = %self.side, error = %e, "assigned identities not adopted");
            SyncError::Store(e)
        })
    }

    /// Rewrite the own baseline from a forced full store re-read. Recovery
    /// after a persist failure left the recorded baseline untrustworthy.
    pub async fn rederive_baseline(&self) -> SyncResult<RecordSet> {
        let snapshot = self.read_store().await?;
        let mut baseline = snapshot;
        baseline.retain(|r| !r.is_pending());
        self.own.write(baseline.clone()).await?;
        warn!(side = %self.side, records = baseline.len(), "own baseline re-derived from store");
        Ok(baseline)
    }

    /// Current store and baseline contents
    pub async fn inspect(&self) -> SyncResult<SideSnapshot> {
        let store = self.read_store().await?;
        let (own_baseline, peer_baseline) = tokio::try_join!(self.own.read(), self.peer.read())?;
        Ok(SideSnapshot {
            side: self.side,
            store,
            own_baseline,
            peer_baseline,
        })
    }

    async fn read_store(&self) -> SyncResult<RecordSet> {
        let snapshot = self
            .timed("read", self.read_timeout, self.store.read())
            .await?;
        Ok(snapshot)
    }

    async fn persist(
        &self,
        own: RecordSet,
        peer: RecordSet,
    ) -> Result<(), PersistError> {
        self.own.write(own).await?;
        self.peer.write(peer).await
    }

    async fn timed<T>(
        &self,
        operation: &'static str,
        limit: Duration,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StoreError::Timeout {
                operation,
                after: limit,
            })?
    }

    fn validate_incoming(
        &self,
        delta: &Delta,
        snapshot: &RecordSet,
        own: &RecordSet,
    ) -> Result<(), ConsistencyViolation> {
        for change in delta.iter() {
            let id = match change {
                Change::Create(_) => continue,
                Change::Update(record) => record.identity().ok_or_else(|| {
                    ConsistencyViolation::MissingIdentity(record.to_string())
                })?,
                Change::Delete(id) => *id,
            };
            if !snapshot.contains_id(id) && !own.contains_id(id) {
                error!(side = %self.side, id = %id, kind = ?change.kind(), "change for unknown identity");
                return Err(ConsistencyViolation::UnknownIdentity(id));
            }
        }
        Ok(())
    }
}

/// Fold changes that landed on a replica into a baseline
fn absorb(baseline: &mut RecordSet, applied: &AppliedSet) {
    for change in applied {
        baseline.upsert(change.resulting_record());
    }
}
