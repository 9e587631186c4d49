/*
    Store subsystem - Replica and baseline capabilities

    Defines the interfaces the sync core consumes, the error taxonomy, and
    in-memory / file-backed implementations.
*/

pub mod errors;
pub mod file_baseline;
pub mod memory_store;
pub mod traits;

pub use errors::{ConsistencyViolation, PersistError, StoreError, SyncError, SyncResult};
pub use file_baseline::FileBaselineStore;
pub use memory_store::{MemoryBaselineStore, MemoryReplicaStore};
pub use traits::{
    AppliedChange, AppliedSet, ApplyOutcome, BaselineStore, IdentityAssignment, ReplicaStore,
};
