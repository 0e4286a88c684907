//! Known-incomplete ledger and consistency audit commands.

use anyhow::{Context, Result};
use phasegate::config::PipelineConfig;
use phasegate::ledger::{ItemState, KnownIncompleteItem, NewIncompleteItem};

use super::super::{Cli, LedgerCommands};
use super::{open_pipeline, print_json};

fn print_item(item: &KnownIncompleteItem) {
    let state = if item.is_resolved() {
        console::style(item.state.to_string()).green()
    } else {
        console::style(item.state.to_string()).red()
    };
    println!("{} [{}] {}", console::style(&item.id).dim(), state, item.item);
    println!("    phase {}  impact: {}", item.phase, item.impact);
    if let Some(function) = &item.affected_function {
        println!("    affects: {}", function);
    }
    if let Some(evidence) = &item.resolution_evidence {
        println!("    evidence: {}", evidence);
    }
}

pub fn cmd_ledger(cli: &Cli, config: &PipelineConfig, command: LedgerCommands) -> Result<bool> {
    let mut pipeline = open_pipeline(config)?;

    match command {
        LedgerCommands::Add {
            item,
            state,
            impact,
            phase,
            function,
        } => {
            let state: ItemState = state.parse().context("Invalid --state")?;
            if state == ItemState::Resolved {
                anyhow::bail!(
                    "Items cannot be added as RESOLVED; add them open and use 'phasegate ledger resolve' with evidence"
                );
            }
            let added = pipeline.ledger.append(NewIncompleteItem {
                item,
                state,
                impact,
                phase,
                affected_function: function,
            });
            if cli.json {
                print_json(&added)?;
            } else {
                println!("{} {}", console::style("Recorded").yellow().bold(), added.id);
            }
            Ok(true)
        }
        LedgerCommands::Resolve { id, evidence } => {
            let known = pipeline.ledger.get_all().into_iter().find(|i| i.id == id);
            pipeline.ledger.resolve(&id, &evidence)?;
            match known {
                Some(item) if item.is_resolved() => println!("{} was already resolved", id),
                Some(_) => println!("{} {}", console::style("Resolved").green().bold(), id),
                None => println!("No ledger item with id {}", id),
            }
            Ok(true)
        }
        LedgerCommands::List { open } => {
            let items = if open {
                pipeline.ledger.get_unresolved()
            } else {
                pipeline.ledger.get_all()
            };
            if cli.json {
                print_json(&items)?;
                return Ok(true);
            }
            if items.is_empty() {
                println!("No known-incomplete items");
                return Ok(true);
            }
            for item in &items {
                print_item(item);
            }
            Ok(true)
        }
        LedgerCommands::Summary => {
            let summary = pipeline.ledger.get_summary();
            if cli.json {
                print_json(&summary)?;
                return Ok(true);
            }
            println!("DISABLED:   {}", summary.disabled);
            println!("BUGGY:      {}", summary.buggy);
            println!("UNVERIFIED: {}", summary.unverified);
            println!("PARTIAL:    {}", summary.partial);
            println!("RESOLVED:   {}", summary.resolved);
            println!("Total: {} ({} open)", summary.total(), summary.open());
            Ok(true)
        }
    }
}

pub fn cmd_audit(cli: &Cli, config: &PipelineConfig, exit_code: Option<i32>) -> Result<bool> {
    let pipeline = open_pipeline(config)?;
    let finding = pipeline.audit(exit_code);

    if cli.json {
        print_json(&finding)?;
    } else if finding.discrepancy {
        println!("{} {}", console::style("✗").red().bold(), finding.message);
    } else {
        println!("{} {}", console::style("✓").green().bold(), finding.message);
    }
    Ok(!finding.discrepancy)
}
