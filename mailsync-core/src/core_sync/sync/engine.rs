/*
    engine.rs - Drives sync cycles for one replica pair

    Cycle:
      Idle -> ComputingDeltas -> ApplyingDeltas -> Committed -> Idle

    - Both deltas are computed before either is applied. The compute phase
      can be cancelled; nothing has been written at that point.
    - Conflicts are settled between the two phases.
    - Applies run concurrently, then each side acknowledges what the peer
      accepted. This phase runs in its own task holding the cycle guard, so
      dropping the caller's future does not interrupt it.
    - One cycle at a time per pair. A cycle started while another is
      running fails with CycleInProgress.
*/

use super::conflict::{resolve_conflicts, Conflict};
use super::delta::Delta;
use super::reconciler::{Side, SideReconciler, SideSnapshot};
use crate::config::SyncConfig;
use crate::core_sync::store::errors::{SyncError, SyncResult};
use crate::core_sync::store::traits::AppliedSet;
use crate::metrics::{self, MetricsCollector, MetricsSnapshot, Timer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Phase of the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleState {
    Idle,
    ComputingDeltas,
    ApplyingDeltas,
    Committed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::ComputingDeltas => "computing",
            CycleState::ApplyingDeltas => "applying",
            CycleState::Committed => "committed",
        };
        write!(f, "{}", name)
    }
}

/// Overall result of a completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every change landed and was acknowledged
    Committed,
    /// Everything else landed, but conflicts were flagged
    Conflicted,
    /// An apply or acknowledge failed; the next cycle retries
    PartiallyFailed,
}

/// What one cycle did
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    /// Changes sent from left to right (after conflict resolution)
    pub left_delta: Delta,
    /// Changes sent from right to left (after conflict resolution)
    pub right_delta: Delta,
    pub conflicts: Vec<Conflict>,
    /// Right's delta applied to the left replica
    pub left_apply_result: SyncResult<AppliedSet>,
    /// Left's delta applied to the right replica
    pub right_apply_result: SyncResult<AppliedSet>,
    /// Left acknowledging what right accepted; None when nothing landed
    pub left_ack: Option<SyncResult<()>>,
    pub right_ack: Option<SyncResult<()>>,
    pub duration: Duration,
}

impl CycleReport {
    pub fn outcome(&self) -> CycleOutcome {
        let ack_failed = |ack: &Option<SyncResult<()>>| matches!(ack, Some(Err(_)));
        if self.left_apply_result.is_err()
            || self.right_apply_result.is_err()
            || ack_failed(&self.left_ack)
            || ack_failed(&self.right_ack)
        {
            CycleOutcome::PartiallyFailed
        } else if !self.conflicts.is_empty() {
            CycleOutcome::Conflicted
        } else {
            CycleOutcome::Committed
        }
    }

    /// Nothing to send in either direction and nothing contested
    pub fn is_quiescent(&self) -> bool {
        self.left_delta.is_empty() && self.right_delta.is_empty() && self.conflicts.is_empty()
    }

    /// Apply errors, left side first
    pub fn errors(&self) -> Vec<&SyncError> {
        [&self.left_apply_result, &self.right_apply_result]
            .into_iter()
            .filter_map(|r| r.as_ref().err())
            .chain(
                [&self.left_ack, &self.right_ack]
                    .into_iter()
                    .filter_map(|ack| ack.as_ref()?.as_ref().err()),
            )
            .collect()
    }
}

/// Both sides' stores and baselines plus the engine state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub state: CycleState,
    pub left: SideSnapshot,
    pub right: SideSnapshot,
}

impl EngineSnapshot {
    /// Both stores hold the same records
    pub fn converged(&self) -> bool {
        self.left.store.same_contents(&self.right.store)
    }
}

struct ApplyPhase {
    left_delta: Delta,
    right_delta: Delta,
    left_apply_result: SyncResult<AppliedSet>,
    right_apply_result: SyncResult<AppliedSet>,
    left_ack: Option<SyncResult<()>>,
    right_ack: Option<SyncResult<()>>,
}

/// Sync engine for one left/right replica pair
pub struct SyncEngine {
    left: Arc<SideReconciler>,
    right: Arc<SideReconciler>,
    config: SyncConfig,
    cycle_guard: Arc<Mutex<()>>,
    state: Arc<watch::Sender<CycleState>>,
    stats: Arc<MetricsCollector>,
}

impl SyncEngine {
    /// Build an engine over two reconcilers. Store timeouts from `config`
    /// replace the reconcilers' own.
    pub fn new(left: SideReconciler, right: SideReconciler, config: SyncConfig) -> Self {
        debug_assert_eq!(left.side(), Side::Left);
        debug_assert_eq!(right.side(), Side::Right);

        let left = left.with_timeouts(config.read_timeout, config.apply_timeout);
        let right = right.with_timeouts(config.read_timeout, config.apply_timeout);
        let (state, _) = watch::channel(CycleState::Idle);

        Self {
            left: Arc::new(left),
            right: Arc::new(right),
            config,
            cycle_guard: Arc::new(Mutex::new(())),
            state: Arc::new(state),
            stats: Arc::new(MetricsCollector::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn reconciler(&self, side: Side) -> &SideReconciler {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<CycleState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> MetricsSnapshot {
        self.stats.snapshot()
    }

    /// Run one full cycle
    pub async fn run_cycle(&self) -> SyncResult<CycleReport> {
        self.run_cycle_until(std::future::pending::<()>()).await
    }

    /// Run one cycle, abandoning it if `cancel` completes before the apply
    /// phase starts. Once applying, the cycle always runs to the end.
    pub async fn run_cycle_until<C>(&self, cancel: C) -> SyncResult<CycleReport>
    where
        C: Future<Output = ()>,
    {
        let guard = self
            .cycle_guard
            .clone()
            .try_lock_owned()
            .map_err(|_| SyncError::CycleInProgress)?;

        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("sync_cycle", cycle = %cycle_id);
        let timer = Timer::new(metrics::CYCLE_DURATION);

        self.state.send_replace(CycleState::ComputingDeltas);
        let computed = tokio::select! {
            biased;
            _ = cancel => {
                self.state.send_replace(CycleState::Idle);
                self.stats.inc_cancelled();
                metrics::record_counter(metrics::CYCLES_CANCELLED, 1);
                info!(parent: &span, "cycle cancelled before apply");
                return Err(SyncError::Cancelled);
            }
            result = async {
                tokio::try_join!(self.left.compute_delta(), self.right.compute_delta())
            }.instrument(span.clone()) => result,
        };

        let (mut left_delta, mut right_delta) = match computed {
            Ok(deltas) => deltas,
            Err(e) => {
                self.state.send_replace(CycleState::Idle);
                self.stats.inc_failed();
                metrics::record_counter(metrics::CYCLES_FAILED, 1);
                warn!(parent: &span, error = %e, "cycle aborted while computing deltas");
                return Err(e);
            }
        };

        let conflicts = resolve_conflicts(
            &mut left_delta,
            &mut right_delta,
            self.config.conflict_strategy,
        );
        for conflict in &conflicts {
            warn!(
                parent: &span,
                id = %conflict.identity,
                left = %conflict.left,
                right = %conflict.right,
                resolution = ?conflict.resolution,
                "conflicting changes"
            );
        }
        self.record_sent(&left_delta, &right_delta, conflicts.len());

        self.state.send_replace(CycleState::ApplyingDeltas);
        let left = Arc::clone(&self.left);
        let right = Arc::clone(&self.right);
        let state = Arc::clone(&self.state);
        let apply = tokio::spawn(
            async move {
                let phase = apply_and_acknowledge(&left, &right, left_delta, right_delta).await;
                state.send_replace(CycleState::Committed);
                state.send_replace(CycleState::Idle);
                drop(guard);
                phase
            }
            .instrument(span.clone()),
        );

        let phase = match apply.await {
            Ok(phase) => phase,
            Err(e) => {
                self.state.send_if_modified(|s| {
                    let stuck = *s == CycleState::ApplyingDeltas;
                    if stuck {
                        *s = CycleState::Idle;
                    }
                    stuck
                });
                self.stats.inc_failed();
                metrics::record_counter(metrics::CYCLES_FAILED, 1);
                return Err(SyncError::TaskFailed(e.to_string()));
            }
        };

        let report = CycleReport {
            cycle_id,
            left_delta: phase.left_delta,
            right_delta: phase.right_delta,
            conflicts,
            left_apply_result: phase.left_apply_result,
            right_apply_result: phase.right_apply_result,
            left_ack: phase.left_ack,
            right_ack: phase.right_ack,
            duration: Duration::from_secs_f64(timer.stop() / 1000.0),
        };
        self.record_outcome(&report);

        info!(
            parent: &span,
            outcome = ?report.outcome(),
            sent_left = report.left_delta.len(),
            sent_right = report.right_delta.len(),
            conflicts = report.conflicts.len(),
            duration_ms = report.duration.as_millis() as u64,
            "cycle finished"
        );
        Ok(report)
    }

    /// Current stores and baselines of both sides
    pub async fn inspect(&self) -> SyncResult<EngineSnapshot> {
        let (left, right) = tokio::try_join!(self.left.inspect(), self.right.inspect())?;
        Ok(EngineSnapshot {
            state: self.state(),
            left,
            right,
        })
    }

    /// Rewrite one side's own baseline from its store
    pub async fn rederive_baseline(&self, side: Side) -> SyncResult<()> {
        self.reconciler(side).rederive_baseline().await.map(|_| ())
    }

    /// Run cycles every `cycle_interval` until `stop` completes. A cycle in
    /// its apply phase is allowed to finish first.
    pub async fn run_periodic<S>(&self, stop: S) -> MetricsSnapshot
    where
        S: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let stopper = async move {
            stop.await;
            let _ = stop_tx.send(true);
        };
        tokio::pin!(stopper);

        let mut interval = tokio::time::interval(self.config.cycle_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stopper => break,
                _ = interval.tick() => {}
            }

            let mut cancel_rx = stop_rx.clone();
            let cancel = async move {
                let _ = cancel_rx.wait_for(|stopped| *stopped).await;
            };
            let cycle = self.run_cycle_until(cancel);
            tokio::pin!(cycle);

            let result = tokio::select! {
                result = &mut cycle => result,
                _ = &mut stopper => cycle.await,
            };
            match result {
                Ok(report) if report.is_quiescent() => debug!("replicas in sync"),
                Ok(report) => {
                    for err in report.errors() {
                        warn!(error = %err, "cycle finished with error");
                    }
                }
                Err(SyncError::Cancelled) => break,
                Err(e) => warn!(error = %e, "cycle failed"),
            }
            if *stop_rx.borrow() {
                break;
            }
        }

        self.stats()
    }

    fn record_sent(&self, left: &Delta, right: &Delta, conflicts: usize) {
        metrics::record_counter(
            metrics::CHANGES_CREATED,
            (left.creations() + right.creations()) as u64,
        );
        metrics::record_counter(
            metrics::CHANGES_UPDATED,
            (left.updates() + right.updates()) as u64,
        );
        metrics::record_counter(
            metrics::CHANGES_DELETED,
            (left.deletions() + right.deletions()) as u64,
        );
        metrics::record_counter(metrics::CONFLICTS, conflicts as u64);
        self.stats.add_changes((left.len() + right.len()) as u64);
        self.stats.add_conflicts(conflicts as u64);
    }

    fn record_outcome(&self, report: &CycleReport) {
        match report.outcome() {
            CycleOutcome::Committed => {
                self.stats.inc_committed();
                metrics::record_counter(metrics::CYCLES_COMMITTED, 1);
            }
            CycleOutcome::Conflicted => {
                self.stats.inc_conflicted();
                metrics::record_counter(metrics::CYCLES_CONFLICTED, 1);
            }
            CycleOutcome::PartiallyFailed => {
                self.stats.inc_failed();
                metrics::record_counter(metrics::CYCLES_FAILED, 1);
            }
        }
    }
}

/// What of an apply attempt actually reached the replica
fn landed(result: &SyncResult<AppliedSet>) -> Option<&AppliedSet> {
    match result {
        Ok(applied) => Some(applied),
        Err(e) => e.landed(),
    }
}

async fn apply_and_acknowledge(
    left: &SideReconciler,
    right: &SideReconciler,
    left_delta: Delta,
    right_delta: Delta,
) -> ApplyPhase {
    let (left_apply_result, right_apply_result) = tokio::join!(
        left.apply_incoming(&right_delta),
        right.apply_incoming(&left_delta)
    );

    let left_ack = async {
        match landed(&right_apply_result) {
            Some(applied) => Some(left.acknowledge(&left_delta, applied).await),
            None => None,
        }
    };
    let right_ack = async {
        match landed(&left_apply_result) {
            Some(applied) => Some(right.acknowledge(&right_delta, applied).await),
            None => None,
        }
    };
    let (left_ack, right_ack) = tokio::join!(left_ack, right_ack);

    ApplyPhase {
        left_delta,
        right_delta,
        left_apply_result,
        right_apply_result,
        left_ack,
        right_ack,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_sync::model::{Record, RecordId, RecordSet};
    use crate::core_sync::store::{MemoryBaselineStore, MemoryReplicaStore};

    fn engine_over(left: &MemoryReplicaStore, right: &MemoryReplicaStore) -> SyncEngine {
        SyncEngine::new(
            SideReconciler::new(
                Side::Left,
                left.clone(),
                MemoryBaselineStore::new(),
                MemoryBaselineStore::new(),
            ),
            SideReconciler::new(
                Side::Right,
                right.clone(),
                MemoryBaselineStore::new(),
                MemoryBaselineStore::new(),
            ),
            SyncConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_first_cycle_merges_disjoint_stores() {
        let left = MemoryReplicaStore::with_records(vec![Record::with_id(1, "one")]).unwrap();
        let right = MemoryReplicaStore::with_records(vec![Record::with_id(2, "two")]).unwrap();
        let engine = engine_over(&left, &right);

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.outcome(), CycleOutcome::Committed);
        assert_eq!(engine.state(), CycleState::Idle);

        let snapshot = engine.inspect().await.unwrap();
        assert!(snapshot.converged());
        assert_eq!(snapshot.left.store.len(), 2);

        let second = engine.run_cycle().await.unwrap();
        assert!(second.is_quiescent());
    }

    #[tokio::test]
    async fn test_cancel_before_apply_has_no_effect() {
        let left = MemoryReplicaStore::with_records(vec![Record::with_id(1, "one")]).unwrap();
        let right = MemoryReplicaStore::new();
        let engine = engine_over(&left, &right);

        let err = engine.run_cycle_until(async {}).await.unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert_eq!(engine.state(), CycleState::Idle);
        assert!(right.snapshot().await.is_empty());
        assert_eq!(engine.stats().cycles_cancelled, 1);
    }

    #[tokio::test]
    async fn test_overlapping_cycle_rejected() {
        let left = MemoryReplicaStore::with_records(vec![Record::with_id(1, "one")]).unwrap();
        let right = MemoryReplicaStore::new();
        right.set_apply_delay(Some(Duration::from_millis(100))).await;
        let engine = Arc::new(engine_over(&left, &right));

        let mut states = engine.subscribe_state();
        let running = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run_cycle().await }
        });
        states
            .wait_for(|s| *s == CycleState::ApplyingDeltas)
            .await
            .unwrap();

        assert!(matches!(
            engine.run_cycle().await,
            Err(SyncError::CycleInProgress)
        ));

        let report = running.await.unwrap().unwrap();
        assert_eq!(report.outcome(), CycleOutcome::Committed);
    }

    #[tokio::test]
    async fn test_compute_failure_aborts_cycle() {
        let left = MemoryReplicaStore::with_records(vec![Record::with_id(1, "one")]).unwrap();
        let right = MemoryReplicaStore::new();
        right.fail_next_read("connection reset").await;
        let engine = engine_over(&left, &right);

        let err = engine.run_cycle().await.unwrap_err();
        assert!(err.is_store());
        assert!(right.snapshot().await.is_empty());
        assert_eq!(engine.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn test_failed_apply_reported_and_retried() {
        let left = MemoryReplicaStore::with_records(vec![Record::with_id(1, "one")]).unwrap();
        let right = MemoryReplicaStore::new();
        right.fail_next_apply("mailbox locked").await;
        let engine = engine_over(&left, &right);

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.outcome(), CycleOutcome::PartiallyFailed);
        assert!(report.left_ack.is_none());
        assert_eq!(report.errors().len(), 1);

        let retry = engine.run_cycle().await.unwrap();
        assert_eq!(retry.outcome(), CycleOutcome::Committed);
        assert_eq!(retry.left_delta.creations(), 1);
        assert!(right.snapshot().await.contains_id(RecordId(1)));
    }

    #[tokio::test]
    async fn test_run_periodic_stops() {
        let left = MemoryReplicaStore::with_records(vec![Record::with_id(1, "one")]).unwrap();
        let right = MemoryReplicaStore::new();
        let mut config = SyncConfig::default();
        config.cycle_interval = Duration::from_millis(10);
        let engine = SyncEngine::new(
            SideReconciler::new(
                Side::Left,
                left.clone(),
                MemoryBaselineStore::new(),
                MemoryBaselineStore::new(),
            ),
            SideReconciler::new(
                Side::Right,
                right.clone(),
                MemoryBaselineStore::new(),
                MemoryBaselineStore::new(),
            ),
            config,
        );

        let stats = engine
            .run_periodic(tokio::time::sleep(Duration::from_millis(100)))
            .await;
        assert!(stats.cycles_committed >= 1);
        assert!(RecordSet::from_records(vec![Record::with_id(1, "one")])
            .unwrap()
            .same_contents(&right.snapshot().await));
    }
}
