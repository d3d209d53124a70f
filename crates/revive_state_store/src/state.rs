//! On-disk execution state schema and validation.
//!
//! Validation is fail-fast: a state file that does not satisfy the schema or
//! the cross-field invariants is rejected, never repaired. Guessing at a
//! half-broken progress record is how accounts get mutated twice.

use chrono::{DateTime, Utc};
use revive_protocol::{OutcomeStatus, RunMode};
use serde::{Deserialize, Serialize};

/// Expected state file schema version.
pub const STATE_VERSION: &str = "1.0";

/// The durable record of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub schema_version: String,
    pub metadata: StateMetadata,
    pub progress: Progress,
    pub accounts: Accounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMetadata {
    pub project: String,
    pub environment: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub total: usize,
    pub processed: usize,
    pub current_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accounts {
    /// Account codes not yet handled, in processing order
    pub pending: Vec<String>,
    /// Outcomes recorded so far, in processing order
    pub processed: Vec<ProcessedRecord>,
}

/// Outcome of one handled account.
///
/// `error` has already been through the sanitizer by the time it lands here;
/// this struct is written to disk verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRecord {
    pub id: String,
    pub status: OutcomeStatus,
    pub error: Option<String>,
    pub subscription_id: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl ExecutionState {
    /// Check the cross-field invariants a loaded state must satisfy.
    ///
    /// Returns a human-readable reason on the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != STATE_VERSION {
            return Err(format!(
                "unsupported schema version '{}' (expected '{}')",
                self.schema_version, STATE_VERSION
            ));
        }
        if self.progress.processed != self.accounts.processed.len() {
            return Err(format!(
                "progress.processed is {} but {} processed records are present",
                self.progress.processed,
                self.accounts.processed.len()
            ));
        }
        if self.progress.total != self.progress.processed + self.accounts.pending.len() {
            return Err(format!(
                "progress.total is {} but processed ({}) + pending ({}) is {}",
                self.progress.total,
                self.progress.processed,
                self.accounts.pending.len(),
                self.progress.processed + self.accounts.pending.len()
            ));
        }
        if self.accounts.pending.iter().any(|id| id.trim().is_empty()) {
            return Err("pending list contains an empty account code".to_string());
        }
        Ok(())
    }

    /// True if any processed record failed, in which case the state file is
    /// kept on disk after the run for inspection and retry.
    pub fn has_failures(&self) -> bool {
        self.accounts
            .processed
            .iter()
            .any(|record| record.status == OutcomeStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_state() -> ExecutionState {
        let now = Utc::now();
        ExecutionState {
            schema_version: STATE_VERSION.to_string(),
            metadata: StateMetadata {
                project: "acme".to_string(),
                environment: "sandbox".to_string(),
                mode: RunMode::Rescue,
                started_at: now,
                last_updated: now,
            },
            progress: Progress {
                total: 2,
                processed: 1,
                current_index: 1,
            },
            accounts: Accounts {
                pending: vec!["b".to_string()],
                processed: vec![ProcessedRecord {
                    id: "a".to_string(),
                    status: OutcomeStatus::Rescued,
                    error: None,
                    subscription_id: Some("sub_1".to_string()),
                    processed_at: now,
                }],
            },
        }
    }

    #[test]
    fn valid_state_passes() {
        assert!(valid_state().validate().is_ok());
    }

    #[test]
    fn processed_count_mismatch_is_rejected() {
        let mut state = valid_state();
        state.progress.processed = 2;
        state.progress.total = 3;
        let err = state.validate().unwrap_err();
        assert!(err.contains("progress.processed"), "got: {err}");
    }

    #[test]
    fn total_mismatch_is_rejected() {
        let mut state = valid_state();
        state.progress.total = 5;
        let err = state.validate().unwrap_err();
        assert!(err.contains("progress.total"), "got: {err}");
    }

    #[test]
    fn wrong_schema_version_is_rejected() {
        let mut state = valid_state();
        state.schema_version = "0.9".to_string();
        let err = state.validate().unwrap_err();
        assert!(err.contains("schema version"), "got: {err}");
    }

    #[test]
    fn state_serializes_camel_case() {
        let json = serde_json::to_value(valid_state()).unwrap();
        assert!(json.get("schemaVersion").is_some());
        assert!(json["progress"].get("currentIndex").is_some());
        assert!(json["metadata"].get("startedAt").is_some());
        assert!(json["accounts"]["processed"][0].get("subscriptionId").is_some());
    }
}
