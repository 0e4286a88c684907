//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                              |
//! |-----------|-----------------------------------------------|
//! | `project` | `Init`, `Config`                              |
//! | `phase`   | `List`, `Status`, `Input`, `Outputs`, `Reset` |
//! | `approve` | `Gate`, `Approve`                             |
//! | `ledger`  | `Ledger`, `Audit`                             |
//!
//! Commands return `Ok(false)` when they ran but the answer was negative
//! (gate blocked, discrepancy found); `main` maps that to a failing exit code.

pub mod approve;
pub mod ledger;
pub mod phase;
pub mod project;

pub use approve::{cmd_approve, cmd_gate};
pub use ledger::{cmd_audit, cmd_ledger};
pub use phase::{cmd_input, cmd_list, cmd_outputs, cmd_reset, cmd_status};
pub use project::{cmd_config, cmd_init};

use anyhow::Result;
use phasegate::config::{CliOverrides, PipelineConfig};
use phasegate::logging::LogSettings;
use phasegate::pipeline::Pipeline;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

use super::Cli;

pub fn load_config(cli: &Cli, project_dir: &Path) -> Result<PipelineConfig> {
    let overrides = CliOverrides {
        report_file: cli.report_file.clone(),
    };
    PipelineConfig::new(project_dir, &overrides)
}

pub fn init_logging(cli: &Cli, config: &PipelineConfig) -> Result<Option<WorkerGuard>> {
    // File logging only once the project exists, so logging never creates `.phasegate/`.
    let log_dir = config.is_initialized().then_some(config.log_dir.as_path());
    phasegate::logging::init_logging(LogSettings {
        level: &config.log_level,
        json: config.log_json,
        verbose: cli.verbose,
        log_dir,
    })
}

/// Open the pipeline, refusing to run outside an initialized project.
pub(crate) fn open_pipeline(config: &PipelineConfig) -> Result<Pipeline> {
    if !config.is_initialized() {
        anyhow::bail!(
            "No phasegate project found in {}. Run 'phasegate init' first.",
            config.project_dir.display()
        );
    }
    config.ensure_directories()?;
    Pipeline::open(config)
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
