//! The state store itself: initialize, record, resume, discover, clean up.
//!
//! The defining risk is a crash between "account mutated remotely" and
//! "outcome recorded locally". The store bounds that window to one in-flight
//! account by persisting synchronously after every `mark_processed`, with a
//! temp-file + rename write so a reader only ever sees the old or the new
//! state file, never a torn one.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use revive_protocol::{naming, sanitize_error, OutcomeStatus, RunMode, WorkItem};
use thiserror::Error;
use tracing::{debug, warn};

use crate::state::{
    Accounts, ExecutionState, ProcessedRecord, Progress, StateMetadata, STATE_VERSION,
};

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state store used before initialize() or resume_from()")]
    NotInitialized,

    #[error("invalid work items: {0}")]
    InvalidWorkItems(String),

    #[error("account '{0}' is not pending (already processed or never queued)")]
    NotPending(String),

    #[error("corrupted or incompatible state file {path}: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Outcome handed to [`StateStore::mark_processed`] for one account.
#[derive(Debug, Clone)]
pub struct ProcessedOutcome {
    pub status: OutcomeStatus,
    pub error: Option<String>,
    pub subscription_id: Option<String>,
}

impl ProcessedOutcome {
    pub fn success(status: OutcomeStatus, subscription_id: Option<String>) -> Self {
        Self {
            status,
            error: None,
            subscription_id,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            error: Some(error.into()),
            subscription_id: None,
        }
    }
}

/// Durable progress record for one batch run.
pub struct StateStore {
    dir: PathBuf,
    project: String,
    environment: String,
    mode: RunMode,
    state: Option<ExecutionState>,
    path: Option<PathBuf>,
}

impl StateStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        project: impl Into<String>,
        environment: impl Into<String>,
        mode: RunMode,
    ) -> Self {
        Self {
            dir: dir.into(),
            project: project.into(),
            environment: environment.into(),
            mode,
            state: None,
            path: None,
        }
    }

    /// Build the initial state for `items` and perform the first durable write.
    pub fn initialize(&mut self, items: &[WorkItem]) -> Result<(), StateStoreError> {
        let mut seen = Vec::with_capacity(items.len());
        for item in items {
            let code = item.code.trim();
            if code.is_empty() {
                return Err(StateStoreError::InvalidWorkItems(
                    "empty account code".to_string(),
                ));
            }
            if seen.contains(&code) {
                return Err(StateStoreError::InvalidWorkItems(format!(
                    "duplicate account code '{code}'"
                )));
            }
            seen.push(code);
        }

        let now = Utc::now();
        let state = ExecutionState {
            schema_version: STATE_VERSION.to_string(),
            metadata: StateMetadata {
                project: self.project.clone(),
                environment: self.environment.clone(),
                mode: self.mode,
                started_at: now,
                last_updated: now,
            },
            progress: Progress {
                total: items.len(),
                processed: 0,
                current_index: 0,
            },
            accounts: Accounts {
                pending: items.iter().map(|item| item.code.clone()).collect(),
                processed: Vec::new(),
            },
        };

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(naming::state_file_name(&self.project, now));
        self.state = Some(state);
        self.path = Some(path.clone());
        self.persist()?;
        debug!(path = %path.display(), total = items.len(), "state file initialized");
        Ok(())
    }

    /// Record the outcome for `id` and persist synchronously before returning.
    ///
    /// Calling this twice for the same account is a programming error, not a
    /// recoverable condition.
    pub fn mark_processed(
        &mut self,
        id: &str,
        outcome: ProcessedOutcome,
    ) -> Result<(), StateStoreError> {
        let state = self.state.as_mut().ok_or(StateStoreError::NotInitialized)?;

        let position = state
            .accounts
            .pending
            .iter()
            .position(|pending| pending == id)
            .ok_or_else(|| StateStoreError::NotPending(id.to_string()))?;
        state.accounts.pending.remove(position);

        state.accounts.processed.push(ProcessedRecord {
            id: id.to_string(),
            status: outcome.status,
            error: outcome.error.as_deref().map(sanitize_error),
            subscription_id: outcome.subscription_id,
            processed_at: Utc::now(),
        });
        state.progress.processed += 1;
        state.progress.current_index += 1;
        state.metadata.last_updated = Utc::now();

        self.persist()
    }

    /// Load and validate a state file without adopting it.
    pub fn load(path: &Path) -> Result<ExecutionState, StateStoreError> {
        let contents = fs::read_to_string(path)?;
        let state: ExecutionState =
            serde_json::from_str(&contents).map_err(|err| StateStoreError::Corrupted {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        state.validate().map_err(|reason| StateStoreError::Corrupted {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(state)
    }

    /// Adopt a previously loaded state as the live one; subsequent writes go
    /// back to `path`.
    pub fn resume_from(
        &mut self,
        state: ExecutionState,
        path: impl Into<PathBuf>,
    ) -> Result<(), StateStoreError> {
        let path = path.into();
        state.validate().map_err(|reason| StateStoreError::Corrupted {
            path: path.clone(),
            reason,
        })?;
        self.project = state.metadata.project.clone();
        self.environment = state.metadata.environment.clone();
        self.mode = state.metadata.mode;
        self.state = Some(state);
        self.path = Some(path);
        Ok(())
    }

    /// Most recently modified non-temporary state file for `project` in `dir`
    /// that records a `mode` run.
    ///
    /// State files for other run modes are passed over, so a retained
    /// rollback state cannot shadow a resumable rescue. A candidate that
    /// fails to load is still fatal, never skipped.
    pub fn discover_latest(
        dir: &Path,
        project: &str,
        mode: RunMode,
    ) -> Result<Option<(PathBuf, ExecutionState)>, StateStoreError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut candidates: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !naming::is_state_file_for(name, project) {
                continue;
            }
            candidates.push((entry.metadata()?.modified()?, entry.path()));
        }
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, path) in candidates {
            let state = Self::load(&path)?;
            if state.metadata.mode == mode {
                return Ok(Some((path, state)));
            }
        }
        Ok(None)
    }

    // Read-only projections

    pub fn pending_accounts(&self) -> &[String] {
        self.state
            .as_ref()
            .map(|state| state.accounts.pending.as_slice())
            .unwrap_or(&[])
    }

    pub fn processed_records(&self) -> &[ProcessedRecord] {
        self.state
            .as_ref()
            .map(|state| state.accounts.processed.as_slice())
            .unwrap_or(&[])
    }

    pub fn processed_count(&self) -> usize {
        self.state
            .as_ref()
            .map(|state| state.progress.processed)
            .unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.state
            .as_ref()
            .map(|state| state.progress.total)
            .unwrap_or(0)
    }

    pub fn has_failures(&self) -> bool {
        self.state
            .as_ref()
            .map(ExecutionState::has_failures)
            .unwrap_or(false)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Delete the state file and sweep any leftover temporaries for this
    /// project. Tolerates files that are already gone.
    pub fn cleanup(&mut self) -> Result<(), StateStoreError> {
        if let Some(path) = self.path.take() {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "state file removed"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if naming::is_state_temp_for(name, &self.project) {
                match fs::remove_file(entry.path()) {
                    Ok(()) => warn!(file = name, "removed orphaned state temp file"),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }

    /// Write the whole state to disk atomically: temp file in the same
    /// directory, fsync, rename over the target.
    fn persist(&self) -> Result<(), StateStoreError> {
        let state = self.state.as_ref().ok_or(StateStoreError::NotInitialized)?;
        let path = self.path.as_ref().ok_or(StateStoreError::NotInitialized)?;

        let json = serde_json::to_string_pretty(state)?;

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StateStoreError::Corrupted {
                path: path.clone(),
                reason: "state path has no file name".to_string(),
            })?;
        let temp_path = self
            .dir
            .join(naming::temp_file_name(file_name));

        let mut file = File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        Ok(())
    }
}
