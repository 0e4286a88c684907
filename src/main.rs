use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;

#[derive(Parser)]
#[command(name = "phasegate")]
#[command(version, about = "Approval-gated phase pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path to the verifier's report. Overrides phasegate.toml and PHASEGATE_REPORT_FILE.
    #[arg(long, global = true)]
    pub report_file: Option<PathBuf>,

    /// Print machine-readable JSON where supported
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new phasegate project
    Init,
    /// List the phase chain and its input rules
    List,
    /// Show pipeline progress, blocked phases, gate and audit state
    Status,
    /// Check whether approval may be offered for a phase
    Gate { phase: String },
    /// Approve a phase's output and start the next phase
    Approve {
        phase: String,
        /// File holding the approved content (stdin if omitted)
        #[arg(short, long)]
        content_file: Option<PathBuf>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Print the assembled input for a phase
    Input { phase: String },
    /// Show recorded phase outputs
    Outputs,
    /// Clear recorded phase outputs and blocked phases (the ledger is kept)
    Reset {
        #[arg(long)]
        force: bool,
    },
    /// Manage the known-incomplete ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },
    /// Cross-check the verifier's exit code against the ledger
    Audit {
        /// Exit code to audit against instead of the latest report
        #[arg(long)]
        exit_code: Option<i32>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum LedgerCommands {
    /// Record a known-incomplete item
    Add {
        /// What is incomplete
        #[arg(long)]
        item: String,
        /// disabled, buggy, unverified, or partial
        #[arg(long)]
        state: String,
        /// What the gap breaks
        #[arg(long)]
        impact: String,
        /// Phase the item was found in
        #[arg(long)]
        phase: String,
        /// Function or component affected
        #[arg(long)]
        function: Option<String>,
    },
    /// Resolve an item with evidence
    Resolve {
        id: String,
        #[arg(long)]
        evidence: String,
    },
    /// List items
    List {
        /// Only unresolved items
        #[arg(long)]
        open: bool,
    },
    /// Count items per state
    Summary,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = cmd::load_config(&cli, &project_dir)?;
    let _log_guard = cmd::init_logging(&cli, &config)?;

    let ok = match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::List => cmd::cmd_list(&config)?,
        Commands::Status => cmd::cmd_status(&config)?,
        Commands::Gate { phase } => cmd::cmd_gate(&cli, &config, phase)?,
        Commands::Approve {
            phase,
            content_file,
            yes,
        } => cmd::cmd_approve(&cli, &config, phase, content_file.as_deref(), *yes).await?,
        Commands::Input { phase } => cmd::cmd_input(&config, phase)?,
        Commands::Outputs => cmd::cmd_outputs(&cli, &config)?,
        Commands::Reset { force } => cmd::cmd_reset(&config, *force)?,
        Commands::Ledger { command } => cmd::cmd_ledger(&cli, &config, command.clone())?,
        Commands::Audit { exit_code } => cmd::cmd_audit(&cli, &config, *exit_code)?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
