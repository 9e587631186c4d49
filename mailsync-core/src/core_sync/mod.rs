/*
    core_sync - Bidirectional state-based sync of two mailbox replicas

    Each side compares its replica against the state both sides last agreed
    on (its baseline) and sends the difference to the other side.
    Handles:
    - Data model (records, tombstones, record sets)
    - Replica and baseline storage capabilities
    - Delta computation and application per side
    - Conflict detection between the two deltas
    - Cycle orchestration with cancellation and reporting
*/

pub mod model;
pub mod store;
pub mod sync;

#[cfg(test)]
pub mod tests;

// Re-export commonly used types
pub use model::{Attributes, Content, Record, RecordId, RecordSet, RecordState};
pub use store::{
    AppliedSet, BaselineStore, ConsistencyViolation, FileBaselineStore, MemoryBaselineStore,
    MemoryReplicaStore, PersistError, ReplicaStore, StoreError, SyncError, SyncResult,
};
pub use sync::{
    Change, ConflictStrategy, CycleOutcome, CycleReport, CycleState, Delta, EngineSnapshot, Side,
    SideReconciler, SyncEngine,
};
