//! Gate check and approval commands.

use anyhow::{Context, Result};
use dialoguer::{Confirm, theme::ColorfulTheme};
use phasegate::config::PipelineConfig;
use phasegate::gates::GateResult;
use phasegate::pipeline::ApprovalOutcome;
use phasegate::sequencer::Transition;
use std::io::Read;
use std::path::Path;

use super::super::Cli;
use super::{open_pipeline, print_json};

fn print_gate(phase: &str, gate: &GateResult) {
    if gate.blocked {
        println!(
            "{} {}",
            console::style("Gate BLOCKED:").red().bold(),
            gate.reason.as_deref().unwrap_or("no reason given")
        );
        if let Some(report) = &gate.details {
            println!(
                "  {} of {} items wired, exit code {}",
                report.wired, report.total, report.exit_code
            );
            for missing in &report.critical_missing {
                println!("  {} {}", console::style("✗").red(), missing);
            }
        }
    } else {
        println!(
            "{} phase {} may be approved ({} wired, {} not wired)",
            console::style("Gate open:").green().bold(),
            phase,
            gate.wired.as_deref().unwrap_or("?"),
            gate.not_wired.unwrap_or_default()
        );
    }
}

pub fn cmd_gate(cli: &Cli, config: &PipelineConfig, phase: &str) -> Result<bool> {
    let pipeline = open_pipeline(config)?;
    let gate = pipeline.gate.check(phase);

    if cli.json {
        print_json(&gate)?;
    } else {
        print_gate(phase, &gate);
    }
    Ok(!gate.blocked)
}

fn read_content(content_file: Option<&Path>) -> Result<String> {
    match content_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read content from {}", path.display())),
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read content from stdin")?;
            Ok(content)
        }
    }
}

pub async fn cmd_approve(
    cli: &Cli,
    config: &PipelineConfig,
    phase: &str,
    content_file: Option<&Path>,
    yes: bool,
) -> Result<bool> {
    let mut pipeline = open_pipeline(config)?;

    // Check before reading content so a blocked phase never asks for it.
    let gate = pipeline.gate.check(phase);
    if gate.blocked {
        if cli.json {
            print_json(&gate)?;
        } else {
            print_gate(phase, &gate);
        }
        return Ok(false);
    }
    let content = read_content(content_file)?;

    if !yes {
        let confirm = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Approve phase {} ({} chars)?",
                phase,
                content.chars().count()
            ))
            .default(true)
            .interact()
            .unwrap_or(false);
        if !confirm {
            println!("Approval cancelled");
            return Ok(true);
        }
    }

    let outcome = pipeline.approve(phase, &content).await?;
    let transition = match outcome {
        ApprovalOutcome::GateBlocked(gate) => {
            // The report changed between the check and the approval.
            print_gate(phase, &gate);
            return Ok(false);
        }
        ApprovalOutcome::Approved(transition) => transition,
    };

    if cli.json {
        print_json(&transition)?;
    } else {
        println!("{} phase {}", console::style("Approved").green().bold(), phase);
        match &transition {
            Transition::Started { phase: next } => {
                println!("Started phase {}", console::style(next).bold());
                println!("  input: {}", input_path(config, next).display());
            }
            Transition::Blocked { phase: next, reason } => {
                println!(
                    "{} phase {} failed to start: {}",
                    console::style("Blocked:").red().bold(),
                    next,
                    reason
                );
            }
            Transition::Complete => {
                println!("{}", console::style("Pipeline complete").green());
            }
        }
    }

    let finding = pipeline.audit(None);
    if finding.discrepancy {
        eprintln!("{} {}", console::style("⚠").yellow(), finding.message);
    }

    Ok(!matches!(transition, Transition::Blocked { .. }))
}

fn input_path(config: &PipelineConfig, phase: &str) -> std::path::PathBuf {
    config
        .inputs_dir
        .join(format!("{}.md", phasegate::launcher::file_stem(phase)))
}
