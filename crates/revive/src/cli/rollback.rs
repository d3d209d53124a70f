//! Rollback command - reverse a prior run from its results file.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use revive::progress::{LogProgress, ProgressReporter};
use revive::results::{load_results, ResultsWriter};
use revive::rollback::RollbackEngine;
use revive_gateway::HttpGateway;
use revive_protocol::{OutcomeStatus, RunMode, WorkItem};
use revive_state_store::{ProcessedOutcome, StateStore};
use tracing::info;

use crate::cli::settings::Settings;

#[derive(Debug)]
pub struct RollbackArgs {
    pub results: PathBuf,
    pub dry_run: bool,
    pub state_dir: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
}

pub fn run(args: RollbackArgs) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run_async(args))
}

async fn run_async(args: RollbackArgs) -> Result<()> {
    let settings = Settings::from_env()?;
    let gateway = HttpGateway::new(settings.gateway_config())
        .context("Failed to build billing API client")?;

    let source = load_results(&args.results)?;
    if source.execution.mode != RunMode::Rescue {
        bail!(
            "Results file {} records a {} run; only rescue runs can be rolled back",
            args.results.display(),
            source.execution.mode
        );
    }
    if source.clients.is_empty() {
        println!("Nothing to do: results file has no client records.");
        return Ok(());
    }

    // The run identity comes from the results file being reversed, not from
    // the current environment, so artifacts line up with the original run.
    let project = source.execution.project.clone();
    let environment = source.execution.environment.clone();
    if environment != settings.environment {
        info!(
            results = environment,
            current = settings.environment,
            "results file environment differs from REVIVE_ENVIRONMENT"
        );
    }

    let state_dir = args.state_dir.unwrap_or_else(revive_logging::state_dir);
    let results_dir = args.results_dir.unwrap_or_else(revive_logging::results_dir);

    let mut store = StateStore::new(&state_dir, &project, &environment, RunMode::Rollback);
    let items: Vec<WorkItem> = source
        .clients
        .iter()
        .map(|client| WorkItem::new(&client.id))
        .collect();
    store.initialize(&items)?;

    let mut writer = ResultsWriter::new(RunMode::Rollback, project, environment)
        .with_source_file(&args.results);
    let engine = RollbackEngine::new(&gateway, args.dry_run);
    let progress = LogProgress;

    let (_, summary) = engine
        .process_all_clients(&source.clients, |current, total, original, result| {
            let outcome = match result.status {
                OutcomeStatus::Failed => ProcessedOutcome::failed(
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| "rollback failed".to_string()),
                ),
                status => ProcessedOutcome::success(status, None),
            };
            store.mark_processed(&original.id, outcome)?;
            writer.add(result.to_audit_record(original));
            progress.on_item(current, total, &original.id);
            Ok(())
        })
        .await?;

    let results_path = writer.write(&results_dir)?;
    println!(
        "Rollback complete: {} processed, {} rolled back, {} skipped, {} failed",
        summary.total, summary.rolled_back, summary.skipped, summary.failed,
    );
    println!("Results written to {}", results_path.display());

    if summary.failed > 0 {
        if let Some(path) = store.path() {
            println!("Some items failed; state retained at {}", path.display());
        }
    } else {
        store.cleanup()?;
    }

    Ok(())
}
