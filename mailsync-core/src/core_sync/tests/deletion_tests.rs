/*
    Deletion propagation tests

    Tests:
    1. Local deletion becomes a tombstone delta and removes the peer's copy
    2. Tombstones are pruned from every baseline once both sides settled
    3. A pruned deletion is never resurrected
    4. A stale re-read of a deleted record is ignored
    5. Deleting on both sides at once
*/

use super::harness::{mailbox, Pair};
use crate::core_sync::model::{Record, RecordId};
use crate::core_sync::store::{ApplyOutcome, BaselineStore};
use crate::core_sync::sync::{Change, CycleOutcome};

async fn synced_pair() -> Pair {
    let pair = Pair::new(mailbox(1..=3), vec![]);
    pair.engine.run_cycle().await.unwrap();
    assert!(pair.converged().await);
    pair
}

#[tokio::test]
async fn test_deletion_propagates_as_tombstone() {
    let pair = synced_pair().await;
    pair.left.delete(RecordId(2)).await.unwrap();

    let report = pair.engine.run_cycle().await.unwrap();
    assert_eq!(report.left_delta.deletions(), 1);
    assert!(matches!(
        report.left_delta.get(RecordId(2)),
        Some(Change::Delete(_))
    ));
    let applied = report.right_apply_result.as_ref().unwrap();
    assert_eq!(applied.count(ApplyOutcome::Deleted), 1);

    assert!(!pair.right.snapshot().await.contains_id(RecordId(2)));
    assert!(pair.converged().await);
    assert_eq!(pair.tombstone_count().await, 4);
}

#[tokio::test]
async fn test_tombstones_pruned_after_settling() {
    let pair = synced_pair().await;
    pair.right.delete(RecordId(3)).await.unwrap();

    pair.engine.run_cycle().await.unwrap();
    assert!(pair.tombstone_count().await > 0);

    let settle = pair.engine.run_cycle().await.unwrap();
    assert!(settle.is_quiescent());
    assert_eq!(settle.right_delta.settled_tombstones(), &[RecordId(3)]);
    assert_eq!(pair.tombstone_count().await, 0);

    let own = pair.left_own.read().await.unwrap();
    assert!(!own.contains_id(RecordId(3)));
}

#[tokio::test]
async fn test_no_resurrection_after_prune() {
    let pair = synced_pair().await;
    pair.left.delete(RecordId(1)).await.unwrap();

    for _ in 0..4 {
        let report = pair.engine.run_cycle().await.unwrap();
        assert_eq!(report.outcome(), CycleOutcome::Committed);
    }

    assert!(!pair.left.snapshot().await.contains_id(RecordId(1)));
    assert!(!pair.right.snapshot().await.contains_id(RecordId(1)));
    assert!(pair.engine.run_cycle().await.unwrap().is_quiescent());
}

#[tokio::test]
async fn test_stale_reread_does_not_resurrect() {
    let pair = synced_pair().await;
    pair.left.delete(RecordId(2)).await.unwrap();
    pair.engine.run_cycle().await.unwrap();

    // backend hands back the deleted message before the tombstone settled
    pair.left.insert(Record::with_id(2, "body2")).await.unwrap();
    let report = pair.engine.run_cycle().await.unwrap();

    assert!(report.left_delta.get(RecordId(2)).is_none());
    assert!(!pair.right.snapshot().await.contains_id(RecordId(2)));
}

#[tokio::test]
async fn test_concurrent_deletion_on_both_sides() {
    let pair = synced_pair().await;
    pair.left.delete(RecordId(2)).await.unwrap();
    pair.right.delete(RecordId(2)).await.unwrap();

    let report = pair.engine.run_cycle().await.unwrap();
    assert!(report.conflicts.is_empty());
    let applied = report.left_apply_result.as_ref().unwrap();
    assert_eq!(applied.count(ApplyOutcome::AlreadyAbsent), 1);

    pair.engine.run_cycle().await.unwrap();
    assert_eq!(pair.tombstone_count().await, 0);
    assert!(pair.converged().await);
}
