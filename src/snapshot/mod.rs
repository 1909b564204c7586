//! Component B — Snapshot & Report Store: durable write-through of
//! per-iteration state and a final run report, plus the optional workflow
//! persistence extension. Grounded on `audit/logger.rs`'s stateful
//! accumulator-with-strict-error-propagation pattern.

mod report;
mod store;

pub use report::{derive_outcome, ReportStore, RunOutcome, RunReport};
pub use store::{derive_recovery_strategy, WorkflowStore};
