//! `weft checkpoint create|restore|list`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use uuid::Uuid;
use weft::errors::WeftError;
use weft::ui::report::render_checkpoints;

use super::super::{CheckpointCommands, Cli};
use super::load_config;

pub fn cmd_checkpoint(project_dir: &Path, cli: &Cli, command: &CheckpointCommands) -> Result<()> {
    use dialoguer::Confirm;

    let config = load_config(project_dir, cli)?;
    config.ensure_directories()?;
    let store = config.checkpoints();
    let registry = config.registry();
    let ledger = config.ledger();

    match command {
        CheckpointCommands::Create { id, operation } => {
            let checkpoint = store
                .create(&registry, &ledger, id, operation)
                .map_err(WeftError::Persistence)?;
            println!(
                "Created checkpoint {} for {}",
                style(checkpoint.id).cyan(),
                id
            );
        }
        CheckpointCommands::Restore { checkpoint_id } => {
            let checkpoint_id: Uuid = checkpoint_id
                .parse()
                .with_context(|| format!("Invalid checkpoint id '{}'", checkpoint_id))?;

            if !cli.yes {
                let confirm = Confirm::new()
                    .with_prompt(format!(
                        "Restore checkpoint {}? The work item and its ledger will be replaced.",
                        checkpoint_id
                    ))
                    .default(false)
                    .interact()
                    .unwrap_or(false);
                if !confirm {
                    println!("Restore cancelled");
                    return Ok(());
                }
            }

            let safety = store
                .restore(checkpoint_id, &registry, &ledger)
                .map_err(WeftError::Persistence)?;
            println!(
                "Restored checkpoint {} (previous state saved as {})",
                style(checkpoint_id).cyan(),
                style(safety.id).dim()
            );
        }
        CheckpointCommands::List { id } => {
            let summaries = store.list(id.as_deref()).map_err(WeftError::Persistence)?;
            print!("{}", render_checkpoints(&summaries));
        }
    }
    Ok(())
}
