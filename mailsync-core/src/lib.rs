pub mod config;
pub mod core_sync;
pub mod logging;
pub mod metrics;
pub mod shutdown;

pub use config::{Config, SyncConfig};
pub use core_sync::{
    ConflictStrategy, CycleReport, Record, RecordId, RecordSet, Side, SideReconciler, SyncEngine,
    SyncError, SyncResult,
};
pub use logging::{init_logging, LogLevel};
