//! File naming for durable artifacts.
//!
//! State files: `revive-state-<project>-<timestamp>.json`
//! Results files: `revive-results-<project>-<timestamp>.json`
//! Atomic-write temporaries add a `.tmp.<pid>.<nanos>` suffix and must never
//! be picked up as real artifacts by discovery.

use chrono::{DateTime, Utc};

pub const STATE_PREFIX: &str = "revive-state";
pub const RESULTS_PREFIX: &str = "revive-results";

/// Compact UTC timestamp, filesystem-safe ("20260829T143501Z").
pub fn file_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn state_file_name(project: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}-{}.json", STATE_PREFIX, project, file_timestamp(at))
}

pub fn results_file_name(project: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}-{}.json", RESULTS_PREFIX, project, file_timestamp(at))
}

/// Temporary-file name for an atomic write of `file_name`.
///
/// Pid plus nanos keeps temporaries from colliding with leftovers of a
/// crashed prior process.
pub fn temp_file_name(file_name: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{}.tmp.{}.{}", file_name, std::process::id(), nanos)
}

pub fn is_temp_file(file_name: &str) -> bool {
    file_name.contains(".tmp.")
}

/// True if `file_name` is a real (non-temporary) state file for `project`.
pub fn is_state_file_for(file_name: &str, project: &str) -> bool {
    let prefix = format!("{}-{}-", STATE_PREFIX, project);
    file_name.starts_with(&prefix) && file_name.ends_with(".json") && !is_temp_file(file_name)
}

/// True if `file_name` is a leftover temporary for any state file of `project`.
pub fn is_state_temp_for(file_name: &str, project: &str) -> bool {
    let prefix = format!("{}-{}-", STATE_PREFIX, project);
    file_name.starts_with(&prefix) && is_temp_file(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn state_file_name_is_stable() {
        let at = Utc.with_ymd_and_hms(2026, 8, 29, 14, 35, 1).unwrap();
        assert_eq!(
            state_file_name("acme", at),
            "revive-state-acme-20260829T143501Z.json"
        );
    }

    #[test]
    fn temp_files_are_never_state_files() {
        let at = Utc.with_ymd_and_hms(2026, 8, 29, 14, 35, 1).unwrap();
        let name = state_file_name("acme", at);
        let temp = temp_file_name(&name);
        assert!(is_state_file_for(&name, "acme"));
        assert!(!is_state_file_for(&temp, "acme"));
        assert!(is_temp_file(&temp));
        assert!(is_state_temp_for(&temp, "acme"));
    }

    #[test]
    fn state_file_matching_is_project_scoped() {
        let at = Utc.with_ymd_and_hms(2026, 8, 29, 14, 35, 1).unwrap();
        let name = state_file_name("acme", at);
        assert!(!is_state_file_for(&name, "other"));
        assert!(!is_state_file_for(&results_file_name("acme", at), "acme"));
    }
}
