//! Phase listing, status, input, outputs, and reset commands.

use anyhow::Result;
use phasegate::config::PipelineConfig;

use super::super::Cli;
use super::{open_pipeline, print_json};

pub fn cmd_list(config: &PipelineConfig) -> Result<bool> {
    let pipeline = open_pipeline(config)?;
    let chain = pipeline.sequencer.chain();

    println!();
    println!("Phases loaded from: {}", config.phases_file.display());
    println!();
    println!("{:<8} {:<20} Input", "Phase", "Name");
    println!("{:<8} {:<20} -----", "--------", "--------------------");

    for phase in chain.phases() {
        let input = match &phase.input {
            Some(rule) if rule.sources.is_empty() => "instruction only".to_string(),
            Some(rule) => rule
                .sources
                .iter()
                .map(|s| s.phase.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            None => "previous phase output".to_string(),
        };
        println!("{:<8} {:<20} {}", phase.id, phase.name, input);
    }
    println!();
    println!("{} phases defined", chain.len());
    println!();
    Ok(true)
}

pub fn cmd_status(config: &PipelineConfig) -> Result<bool> {
    println!();
    println!("Phasegate Status");
    println!("================");
    println!();

    if !config.is_initialized() {
        println!("Project: Not initialized");
        println!();
        println!("Run 'phasegate init' to initialize the project.");
        println!();
        return Ok(true);
    }

    let pipeline = open_pipeline(config)?;
    let outputs = pipeline.sequencer.get_phase_outputs();
    let blocked = pipeline.blocked.list();

    println!("Phases:");
    for phase in pipeline.sequencer.chain().phases() {
        let marker = if let Some(out) = outputs.get(&phase.id) {
            format!(
                "{} approved {}",
                console::style("✓").green(),
                out.approved_at.format("%Y-%m-%d %H:%M:%S")
            )
        } else if let Some(b) = blocked.get(&phase.id) {
            format!("{} blocked: {}", console::style("✗").red(), b.reason)
        } else {
            console::style("pending").dim().to_string()
        };
        println!("  {:<8} {:<20} {}", phase.id, phase.name, marker);
    }
    println!();

    let last = pipeline.sequencer.last_approved().map(str::to_string);
    let current = match &last {
        Some(last) => pipeline.sequencer.get_next_phase(last),
        None => pipeline.sequencer.chain().first().map(|p| p.id.clone()),
    };
    match (&last, &current) {
        (None, _) => println!("Execution:  Not started"),
        (Some(_), Some(next)) => println!("Next phase: {}", next),
        (Some(_), None) => println!("Execution:  Pipeline complete"),
    }

    if let Some(phase) = current {
        let gate = pipeline.gate.check(&phase);
        if gate.blocked {
            println!(
                "Gate:       {} {}",
                console::style("BLOCKED").red().bold(),
                gate.reason.unwrap_or_default()
            );
        } else {
            println!(
                "Gate:       {} ({} wired)",
                console::style("open").green(),
                gate.wired.unwrap_or_default()
            );
        }
    }

    let summary = pipeline.ledger.get_summary();
    println!(
        "Ledger:     {} open, {} resolved",
        summary.open(),
        summary.resolved
    );

    let finding = pipeline.audit(None);
    if finding.discrepancy || !finding.malformed.is_empty() {
        println!();
        println!("{} {}", console::style("⚠").yellow(), finding.message);
    }
    println!();
    Ok(true)
}

pub fn cmd_input(config: &PipelineConfig, phase: &str) -> Result<bool> {
    let pipeline = open_pipeline(config)?;
    if !pipeline.sequencer.chain().contains(phase) {
        eprintln!(
            "{} phase {} is not in the chain; showing the generic start input",
            console::style("Warning:").yellow(),
            phase
        );
    }
    print!("{}", pipeline.sequencer.build_next_input(phase));
    println!();
    Ok(true)
}

pub fn cmd_outputs(cli: &Cli, config: &PipelineConfig) -> Result<bool> {
    let pipeline = open_pipeline(config)?;
    let outputs = pipeline.sequencer.get_phase_outputs();

    if cli.json {
        print_json(&outputs)?;
        return Ok(true);
    }

    if outputs.is_empty() {
        println!("No phase outputs recorded");
        return Ok(true);
    }
    for (phase, out) in &outputs {
        println!(
            "{} {} ({} chars, approved {})",
            console::style("Phase").bold(),
            console::style(phase).bold(),
            out.content.chars().count(),
            out.approved_at.format("%Y-%m-%d %H:%M:%S")
        );
        for line in out.content.lines().take(5) {
            println!("  {}", line);
        }
        println!();
    }
    Ok(true)
}

pub fn cmd_reset(config: &PipelineConfig, force: bool) -> Result<bool> {
    use dialoguer::Confirm;

    let mut pipeline = open_pipeline(config)?;

    if !force {
        let confirm = Confirm::new()
            .with_prompt("This will clear all approved phase outputs. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(true);
        }
    }

    pipeline.reset();
    println!("Reset complete (known-incomplete ledger kept)");
    Ok(true)
}
