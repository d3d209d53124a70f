//! Rescue command - drive a batch of accounts through the rescue engine.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use revive::controller::ExecutionController;
use revive::progress::{LogProgress, ProgressReporter, StdinPrompt};
use revive::rescue::RescueEngine;
use revive::results::ResultsWriter;
use revive_gateway::HttpGateway;
use revive_protocol::{OutcomeStatus, RunMode, WorkItem};
use revive_state_store::{ProcessedOutcome, StateStore};
use serde_json::Value;
use tracing::info;

use crate::cli::error::HelpfulError;
use crate::cli::settings::Settings;

#[derive(Debug)]
pub struct RescueArgs {
    pub file: Option<PathBuf>,
    pub plan: String,
    pub interval: Option<usize>,
    pub resume: bool,
    pub dry_run: bool,
    pub state_dir: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
}

pub fn run(args: RescueArgs) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run_async(args))
}

async fn run_async(args: RescueArgs) -> Result<()> {
    let settings = Settings::from_env()?;
    let gateway = HttpGateway::new(settings.gateway_config())
        .context("Failed to build billing API client")?;

    let state_dir = args.state_dir.unwrap_or_else(revive_logging::state_dir);
    let results_dir = args.results_dir.unwrap_or_else(revive_logging::results_dir);

    let mut store = StateStore::new(
        &state_dir,
        &settings.project,
        &settings.environment,
        RunMode::Rescue,
    );

    let items: Vec<WorkItem> = if args.resume {
        let (path, state) =
            StateStore::discover_latest(&state_dir, &settings.project, RunMode::Rescue)?
                .ok_or_else(|| HelpfulError::no_resumable_state(&state_dir, &settings.project))?;
        info!(path = %path.display(), "resuming from state file");
        store.resume_from(state, &path)?;
        store
            .pending_accounts()
            .iter()
            .map(WorkItem::new)
            .collect()
    } else {
        let file = args.file.ok_or_else(|| {
            HelpfulError::new("No accounts to process")
                .with_context("Provide an input file, or --resume to pick up an interrupted run")
                .with_suggestion("TRY: revive rescue --file accounts.json --plan rescue-monthly")
        })?;
        let items = load_work_items(&file)?;
        store.initialize(&items)?;
        items
    };

    if items.is_empty() {
        println!("Nothing to do: no pending accounts.");
        store.cleanup()?;
        return Ok(());
    }

    let engine = RescueEngine::new(&gateway, &args.plan, args.dry_run);
    let mut controller = ExecutionController::new(args.interval, items.len());
    let mut prompt = StdinPrompt;
    let progress = LogProgress;
    let mut writer = ResultsWriter::new(
        RunMode::Rescue,
        settings.project.clone(),
        settings.environment.clone(),
    );

    for (index, item) in items.iter().enumerate() {
        let record = engine.process_account(item).await;
        let success = record.status != OutcomeStatus::Failed;

        store.mark_processed(
            &item.code,
            ProcessedOutcome {
                status: record.status,
                error: record.error.clone(),
                subscription_id: record
                    .after
                    .as_ref()
                    .and_then(|after| after.subscription_id.clone()),
            },
        )?;
        writer.add(record);

        progress.on_item(index + 1, items.len(), &item.code);
        controller.record_result(success);
        if !controller.checkpoint(&mut prompt) {
            break;
        }
    }
    controller.finish();

    let results_path = writer.write(&results_dir)?;
    let counters = controller.counters();
    let summary = writer.summary();
    println!(
        "Rescue run {}: {} processed, {} rescued, {} skipped, {} failed",
        if controller.stopped() { "stopped" } else { "complete" },
        counters.processed,
        summary.rescued.unwrap_or(0),
        summary.skipped,
        summary.failed,
    );
    println!("Results written to {}", results_path.display());

    if controller.stopped() || store.has_failures() {
        // Keep the state file so the run can be resumed or inspected
        if let Some(path) = store.path() {
            println!("State retained at {} (resume with --resume)", path.display());
        }
    } else {
        store.cleanup()?;
    }

    Ok(())
}

/// Parse the accounts input file: a JSON array of account codes, or of
/// objects with a "code" field.
fn load_work_items(path: &Path) -> Result<Vec<WorkItem>> {
    if !path.exists() {
        return Err(HelpfulError::accounts_file_not_found(path).into());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read accounts file: {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("Accounts file is not valid JSON: {}", path.display()))?;

    let entries = match value.as_array() {
        Some(entries) => entries,
        None => bail!("Accounts file must be a JSON array: {}", path.display()),
    };

    entries
        .iter()
        .map(|entry| match entry {
            Value::String(code) => Ok(WorkItem::new(code)),
            Value::Object(_) => serde_json::from_value(entry.clone())
                .with_context(|| format!("Invalid account entry: {entry}")),
            other => bail!("Account entries must be strings or objects, got: {other}"),
        })
        .collect()
}
