//! Shared schema for Revive batch runs.
//!
//! Every durable artifact the tool writes (execution state files, results
//! files) and every value that crosses a crate boundary (snapshots, audit
//! records, outcome statuses) is defined here, so the rescue run, the
//! rollback run, and the state store all agree on one schema.

pub mod naming;
pub mod results;
pub mod sanitize;
pub mod types;

// Re-export types for convenience
pub use results::{ExecutionInfo, ResultsFile, RunSummary, RESULTS_VERSION};
pub use sanitize::sanitize_error;
pub use types::{
    AccountSnapshot, AuditRecord, InvoiceSnapshot, InvoiceState, OutcomeStatus, RunMode,
    SubscriptionSnapshot, WorkItem,
};
