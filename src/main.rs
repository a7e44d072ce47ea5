use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use weft::errors::WeftError;

mod cmd;

#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about = "Dependency-ordered task orchestration")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit diagnostics as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Skip confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the .weft/ directory with default settings
    Init,
    /// Register a work item from a JSON file of tasks
    Import {
        /// Path to the work item JSON
        file: PathBuf,
    },
    /// List registered work items
    List,
    /// Score every task's atomicity and record the scores
    Validate {
        id: String,
        /// Override the configured threshold
        #[arg(long)]
        threshold: Option<u8>,
    },
    /// Show the phase plan
    Plan {
        id: String,
        /// Request concurrency for every phase
        #[arg(long, conflicts_with = "sequential")]
        concurrent: bool,
        /// Run every phase sequentially
        #[arg(long)]
        sequential: bool,
    },
    /// Execute a work item's pending tasks phase by phase
    Run {
        id: String,
        /// Skip tasks the ledger already records as completed
        #[arg(long)]
        resume: bool,
        /// UI output mode: full, minimal, json
        #[arg(long, default_value = "full")]
        ui: String,
        /// Override the configured threshold
        #[arg(long)]
        threshold: Option<u8>,
        /// Run every phase sequentially
        #[arg(long)]
        sequential: bool,
    },
    /// Show lifecycle, history and per-phase progress
    Status {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Manually move a work item to another lifecycle state
    Transition {
        id: String,
        /// Target state (planned, in_progress, completed, summarized, archived)
        state: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Record that a completed work item has been summarized
    Summarize {
        id: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Create, restore or list checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
    /// Print a work item's ledger
    Ledger {
        id: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum CheckpointCommands {
    /// Snapshot a work item and its ledger
    Create {
        id: String,
        /// What the snapshot is for
        #[arg(default_value = "manual")]
        operation: String,
    },
    /// Put a work item and its ledger back to a snapshot
    Restore { checkpoint_id: String },
    /// List checkpoints, optionally for one work item
    List { id: Option<String> },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => match std::env::current_dir().context("Failed to get current directory") {
            Ok(dir) => dir,
            Err(e) => return fail(&e),
        },
    };

    let log_dir = weft::init::get_weft_dir(&project_dir).join("logs");
    let _log_guard = weft::logging::init(cli.verbose, cli.log_json, Some(&log_dir));

    match run(&cli, project_dir).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

async fn run(cli: &Cli, project_dir: PathBuf) -> Result<()> {
    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir),
        Commands::Import { file } => cmd::cmd_import(&project_dir, cli, file),
        Commands::List => cmd::cmd_list(&project_dir, cli),
        Commands::Validate { id, threshold } => cmd::cmd_validate(&project_dir, cli, id, *threshold),
        Commands::Plan {
            id,
            concurrent,
            sequential,
        } => cmd::cmd_plan(&project_dir, cli, id, *concurrent, *sequential),
        Commands::Run {
            id,
            resume,
            ui,
            threshold,
            sequential,
        } => {
            cmd::cmd_run(
                &project_dir,
                cli,
                cmd::RunOptions {
                    id,
                    resume: *resume,
                    ui,
                    threshold: *threshold,
                    sequential: *sequential,
                },
            )
            .await
        }
        Commands::Status { id, json } => cmd::cmd_status(&project_dir, cli, id, *json),
        Commands::Transition { id, state, note } => {
            cmd::cmd_transition(&project_dir, cli, id, state, note.as_deref())
        }
        Commands::Summarize { id, note } => {
            cmd::cmd_summarize(&project_dir, cli, id, note.as_deref())
        }
        Commands::Checkpoint { command } => cmd::cmd_checkpoint(&project_dir, cli, command),
        Commands::Ledger { id, json } => cmd::cmd_ledger(&project_dir, cli, id, *json),
    }
}

/// Print the error and map it to the process exit code.
fn fail(err: &anyhow::Error) -> ExitCode {
    eprintln!("{} {:#}", console::style("Error:").red().bold(), err);
    let code = match err.downcast_ref::<WeftError>() {
        Some(weft_err) => {
            eprintln!(
                "{} {}",
                console::style("Next action:").bold(),
                weft_err.next_action()
            );
            weft_err.exit_code()
        }
        None => 1,
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
