/*
    Sync subsystem - Delta computation, conflict handling and cycle driving

    Handles propagation of changes between two replicas via baselines.
*/

pub mod conflict;
pub mod delta;
pub mod engine;
pub mod reconciler;

pub use conflict::{resolve_conflicts, Conflict, ConflictStrategy, Resolution};
pub use delta::{Change, ChangeKind, Delta};
pub use engine::{CycleOutcome, CycleReport, CycleState, EngineSnapshot, SyncEngine};
pub use reconciler::{Side, SideReconciler, SideSnapshot};
