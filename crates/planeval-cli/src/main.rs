//! Planeval - plan-mode evaluation pipeline
//!
//! Grades the plans a coding agent produces in read-only planning mode
//! against tasks synthesized from a repository's merge history.
//!
//! ## Stages
//!
//! - `contextize`: clone the repository and build the compressed repo map
//! - `generate-tasks`: synthesize tasks from merge commits into the ledger
//! - `run-plans`: run the planning agent once per task
//! - `grade`: score each plan on claims, ground truth, and style
//! - `all`: the four stages in order

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;

use planeval_cli::stages;
use planeval_core::{init_tracing, EvalConfig};
use planeval_state::{FsTaskLedger, TaskLedger};

#[derive(Parser)]
#[command(name = "planeval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluate a coding agent's plan mode against merge history", long_about = None)]
struct Cli {
    /// Path to the config file (default: planeval.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Re-execute a stage even when its output already exists
    #[arg(short, long, global = true)]
    force: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone the target repository and build the repo map
    Contextize,

    /// Synthesize evaluation tasks from merge history
    GenerateTasks,

    /// Run the planning agent for every task
    RunPlans,

    /// Grade every plan in the ledger
    Grade,

    /// Run all four stages in order
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let config = EvalConfig::load(cli.config.as_deref())?;
    let ledger: Arc<dyn TaskLedger> = Arc::new(FsTaskLedger::open(config.ledger_dir())?);

    match cli.command {
        Commands::Contextize => {
            let report = stages::run_contextize(&config, cli.force).await?;
            report.print_summary("contextize");
        }
        Commands::GenerateTasks => {
            let report =
                stages::run_generate_tasks(&config, Arc::clone(&ledger), cli.force).await?;
            report.print_summary("generate-tasks");
        }
        Commands::RunPlans => {
            let report = stages::run_plans(&config, Arc::clone(&ledger), cli.force).await?;
            report.print_summary("run-plans");
        }
        Commands::Grade => {
            let report = stages::run_grade(&config, Arc::clone(&ledger), cli.force).await?;
            report.print_summary("grade");
        }
        Commands::All => {
            stages::run_contextize(&config, cli.force)
                .await?
                .print_summary("contextize");
            stages::run_generate_tasks(&config, Arc::clone(&ledger), cli.force)
                .await?
                .print_summary("generate-tasks");
            stages::run_plans(&config, Arc::clone(&ledger), cli.force)
                .await?
                .print_summary("run-plans");
            stages::run_grade(&config, Arc::clone(&ledger), cli.force)
                .await?
                .print_summary("grade");
        }
    }
    Ok(())
}
