//! Project setup and configuration commands: `phasegate init`, `phasegate config`.

use anyhow::Result;
use phasegate::config::{PhasegateToml, PipelineConfig};
use std::path::Path;

use super::super::ConfigCommands;

pub fn cmd_init(project_dir: &Path) -> Result<bool> {
    let result = phasegate::init::init_project(project_dir)?;
    if result.created {
        println!(
            "Initialized phasegate project in {}",
            result.phasegate_dir.display()
        );
    } else {
        println!(
            "Phasegate project already initialized in {}",
            result.phasegate_dir.display()
        );
    }
    println!();
    println!("Next steps:");
    println!("  1. Edit .phasegate/phases.json to define your phase chain");
    println!("  2. Point your verifier at .phasegate/veritas-report.json");
    println!("  3. Run 'phasegate gate 01' before approving the first phase");
    Ok(true)
}

pub fn cmd_config(config: &PipelineConfig, command: Option<ConfigCommands>) -> Result<bool> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Phasegate Configuration");
            println!("=======================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No phasegate.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();
            println!("Effective values (with env/CLI overrides):");
            println!("  phases_file = \"{}\"", config.phases_file.display());
            println!("  report_file = \"{}\"", config.report_file.display());
            println!("  state_dir   = \"{}\"", config.state_dir.display());
            println!("  reapproval  = \"{}\"", config.reapproval);
            match &config.start_cmd {
                Some(cmd) => println!("  start_cmd   = \"{}\"", cmd),
                None => println!("  start_cmd   = (none; inputs are only written to disk)"),
            }
            println!("  log_level   = \"{}\"", config.log_level);
            println!("  log_json    = {}", config.log_json);
            println!();
            Ok(true)
        }
        Some(ConfigCommands::Validate) => {
            let toml = PhasegateToml::load_or_default(&config.phasegate_dir)?;
            let warnings = toml.validate();
            let chain = phasegate::phase::load_chain_or_default(Some(&config.phases_file));

            if let Err(e) = &chain {
                println!("{} {:#}", console::style("Error:").red().bold(), e);
            }
            for warning in &warnings {
                println!("{} {}", console::style("Warning:").yellow(), warning);
            }
            if chain.is_ok() && warnings.is_empty() {
                println!("{}", console::style("Configuration is valid.").green());
            }
            Ok(chain.is_ok())
        }
    }
}
