//! CLI command implementations for the Revive binary.

pub mod error;
pub mod rescue;
pub mod rollback;
pub mod settings;
