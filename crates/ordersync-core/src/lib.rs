pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod io;
pub mod oplog;
pub mod repair;
pub mod store;
pub mod types;

pub use engine::{
    BulkOutcome, BulkRepairResult, ConsistencyReport, ReconcileSettings, Reconciler,
    RepairFailure, Verdict,
};
pub use error::{ReconcileError, Result, Side, StoreError};
pub use repair::{CreateOutcome, RepairOutcome, SyncOutcome};
pub use types::{MirrorStatus, Order, OrderId, Status};
