//! Revive: batch rescue of dunning-closed billing accounts, with durable
//! progress and compensating rollback.
//!
//! The binary drives two kinds of run. A *rescue* run re-subscribes closed
//! accounts to a rescue plan, persisting per-account progress after every
//! item. A *rollback* run reads a finished run's results file and issues
//! ordered, idempotent compensating operations against the billing platform.

pub mod controller;
pub mod progress;
pub mod rescue;
pub mod results;
pub mod rollback;
pub mod snapshot;
