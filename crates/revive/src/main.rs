//! Revive command-line entry point.
//!
//! Two subcommands: `rescue` re-subscribes dunning-closed accounts to a
//! rescue plan, `rollback` reverses a prior run from its results file.
//! Per-item failures never abort a run; file-level and schema-level failures
//! terminate with a non-zero exit.

use clap::{Parser, Subcommand};
use revive_logging::LogConfig;
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "revive", about = "Rescue dunning-closed billing accounts, resumably and reversibly")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Re-subscribe closed accounts to the rescue plan
    Rescue {
        /// JSON file with the accounts to process (array of codes or
        /// objects with a "code" field). Not needed with --resume.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Plan code to subscribe rescued accounts to
        #[arg(long)]
        plan: String,

        /// Pause for confirmation after every N accounts
        #[arg(long)]
        interval: Option<usize>,

        /// Resume the most recent interrupted run for this project
        #[arg(long)]
        resume: bool,

        /// Report what would be done without mutating anything remotely
        #[arg(long)]
        dry_run: bool,

        /// Directory for state files (default: ~/.revive/state)
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Directory for results files (default: ~/.revive/results)
        #[arg(long)]
        results_dir: Option<PathBuf>,
    },

    /// Reverse a prior run from its results file
    Rollback {
        /// Results file of the run to reverse
        #[arg(long)]
        results: PathBuf,

        /// Report what would be done without mutating anything remotely
        #[arg(long)]
        dry_run: bool,

        /// Directory for state files (default: ~/.revive/state)
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Directory for results files (default: ~/.revive/results)
        #[arg(long)]
        results_dir: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = revive_logging::init_logging(LogConfig {
        app_name: "revive",
        verbose: cli.verbose,
    }) {
        eprintln!("Failed to initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Rescue {
            file,
            plan,
            interval,
            resume,
            dry_run,
            state_dir,
            results_dir,
        } => cli::rescue::run(cli::rescue::RescueArgs {
            file,
            plan,
            interval,
            resume,
            dry_run,
            state_dir,
            results_dir,
        }),
        Commands::Rollback {
            results,
            dry_run,
            state_dir,
            results_dir,
        } => cli::rollback::run(cli::rollback::RollbackArgs {
            results,
            dry_run,
            state_dir,
            results_dir,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
