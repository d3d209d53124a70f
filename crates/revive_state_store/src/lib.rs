//! Revive execution state store (per-batch durable progress).
//!
//! One JSON state file per active batch, rewritten atomically after every
//! processed account so a crash loses at most the one in-flight item and
//! `--resume` is a plain "pending minus processed" with no reconciliation.

pub mod state;
pub mod store;

pub use state::{Accounts, ExecutionState, ProcessedRecord, Progress, StateMetadata, STATE_VERSION};
pub use store::{ProcessedOutcome, StateStore, StateStoreError};
