//! Auto-save pipeline.
//!
//! # Responsibility
//! - Make every task-collection mutation eventually durable.
//! - Collapse bursts of edits into the minimum number of writes.
//! - Keep optimistic UI state recoverable through rollback snapshots.
//!
//! # See also
//! - `engine` for the processing pipeline.

pub mod conflict;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod operation;

pub use conflict::{ClientWins, ConflictContext, ConflictResolver, ServerWins, ThreeWayMerge};
pub use engine::{AutoSaveEngine, EngineOptions, SaveOutcome, SaveStatus};
pub use error::{AutoSaveError, FailureKind, SaveFailure};
pub use metrics::AutoSaveMetrics;
pub use operation::{AutoSaveOperation, OperationKind, OperationPayload, Snapshot};
