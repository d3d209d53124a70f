//! Results file writer and loader.
//!
//! The writer accumulates per-account audit records during a run and emits
//! the terminal JSON artifact. That artifact is the sole input of a later
//! rollback run, so it gets the same atomic temp+rename write discipline as
//! the state file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use revive_protocol::{
    naming, sanitize_error, AuditRecord, ExecutionInfo, ResultsFile, RunMode, RunSummary,
    RESULTS_VERSION,
};
use tracing::warn;

pub struct ResultsWriter {
    mode: RunMode,
    project: String,
    environment: String,
    source_file: Option<String>,
    clients: Vec<AuditRecord>,
}

impl ResultsWriter {
    pub fn new(mode: RunMode, project: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            mode,
            project: project.into(),
            environment: environment.into(),
            source_file: None,
            clients: Vec::new(),
        }
    }

    /// Record the basename of the run a rollback reverses, for traceability.
    pub fn with_source_file(mut self, source: &Path) -> Self {
        self.source_file = source
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string);
        self
    }

    /// Add one audit record. Error text is sanitized here, at the last
    /// boundary before durable storage.
    pub fn add(&mut self, mut record: AuditRecord) {
        record.error = record.error.as_deref().map(sanitize_error);
        self.clients.push(record);
    }

    pub fn summary(&self) -> RunSummary {
        ResultsFile::summarize(self.mode, &self.clients)
    }

    /// Write the results artifact into `dir` and return its path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let now = Utc::now();
        let file = ResultsFile {
            version: RESULTS_VERSION.to_string(),
            execution: ExecutionInfo {
                timestamp: now,
                environment: self.environment.clone(),
                project: self.project.clone(),
                mode: self.mode,
                source_file: self.source_file.clone(),
            },
            summary: self.summary(),
            clients: self.clients.clone(),
        };

        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create results directory: {}", dir.display()))?;
        let file_name = naming::results_file_name(&self.project, now);
        let path = dir.join(&file_name);
        let temp_path = dir.join(naming::temp_file_name(&file_name));

        let json = serde_json::to_string_pretty(&file)?;
        let mut out = File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        out.write_all(json.as_bytes())?;
        out.sync_all()?;
        drop(out);
        if let Err(err) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err).with_context(|| format!("Failed to write {}", path.display()));
        }
        Ok(path)
    }
}

/// Load a results file for rollback. Missing required sections are fatal; a
/// version mismatch is only a warning, older artifacts remain readable.
pub fn load_results(path: &Path) -> Result<ResultsFile> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read results file: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("Results file is not valid JSON: {}", path.display()))?;

    for section in ["version", "execution", "summary", "clients"] {
        if value.get(section).is_none() {
            bail!(
                "results file {} is missing required section '{}'",
                path.display(),
                section
            );
        }
    }

    if value.get("version").and_then(serde_json::Value::as_str) != Some(RESULTS_VERSION) {
        warn!(
            path = %path.display(),
            found = %value["version"],
            expected = RESULTS_VERSION,
            "results file version mismatch, attempting to read anyway"
        );
    }

    serde_json::from_value(value)
        .with_context(|| format!("Results file has invalid structure: {}", path.display()))
}
