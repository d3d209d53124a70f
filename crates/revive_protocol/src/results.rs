//! Results file schema.
//!
//! One results file is written per completed batch (rescue or rollback). It
//! is an audit artifact for humans and the machine-readable input of a later
//! rollback run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AuditRecord, RunMode};

/// Results file schema version. The loader warns on mismatch but does not
/// refuse to read.
pub const RESULTS_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsFile {
    pub version: String,
    pub execution: ExecutionInfo,
    pub summary: RunSummary,
    pub clients: Vec<AuditRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub project: String,
    pub mode: RunMode,
    /// Basename of the results file a rollback run reverses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

/// Aggregate counts for a run. `rescued` is set for rescue runs,
/// `rolled_back` for rollback runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescued: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back: Option<usize>,
    pub skipped: usize,
    pub failed: usize,
}

impl ResultsFile {
    /// Tally a summary from audit records.
    pub fn summarize(mode: RunMode, clients: &[AuditRecord]) -> RunSummary {
        let count = |status| clients.iter().filter(|c| c.status == status).count();
        let mut summary = RunSummary {
            total: clients.len(),
            rescued: None,
            rolled_back: None,
            skipped: count(crate::types::OutcomeStatus::Skipped),
            failed: count(crate::types::OutcomeStatus::Failed),
        };
        match mode {
            RunMode::Rescue => summary.rescued = Some(count(crate::types::OutcomeStatus::Rescued)),
            RunMode::Rollback => {
                summary.rolled_back = Some(count(crate::types::OutcomeStatus::RolledBack))
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutcomeStatus;

    fn record(id: &str, status: OutcomeStatus) -> AuditRecord {
        AuditRecord {
            id: id.to_string(),
            status,
            before: None,
            after: None,
            error: None,
            reason: None,
        }
    }

    #[test]
    fn summarize_counts_by_mode() {
        let clients = vec![
            record("a", OutcomeStatus::Rescued),
            record("b", OutcomeStatus::Skipped),
            record("c", OutcomeStatus::Failed),
            record("d", OutcomeStatus::Rescued),
        ];
        let summary = ResultsFile::summarize(RunMode::Rescue, &clients);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.rescued, Some(2));
        assert_eq!(summary.rolled_back, None);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn results_file_round_trips_through_json() {
        let file = ResultsFile {
            version: RESULTS_VERSION.to_string(),
            execution: ExecutionInfo {
                timestamp: Utc::now(),
                environment: "sandbox".to_string(),
                project: "acme".to_string(),
                mode: RunMode::Rollback,
                source_file: Some("revive-results-acme-20260101T000000Z.json".to_string()),
            },
            summary: ResultsFile::summarize(RunMode::Rollback, &[]),
            clients: vec![],
        };
        let json = serde_json::to_string_pretty(&file).unwrap();
        let parsed: ResultsFile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, file);
    }
}
