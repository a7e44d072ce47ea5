//! Project setup: init, import and list.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use weft::dag::DagBuilder;
use weft::errors::WeftError;
use weft::work_item::{WorkItemImport, WorkItemRegistry};

use super::super::Cli;
use super::load_config;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    use weft::init::{init_project, is_initialized};

    let was_initialized = is_initialized(project_dir);
    let result = init_project(project_dir)?;

    if result.created {
        println!("Initialized weft project at {}", result.weft_dir.display());
        println!();
        println!("Created directory structure:");
        println!("  .weft/");
        println!("  ├── weft.toml     # settings");
        println!("  ├── items/        # work items and their ledgers");
        println!("  ├── bundles/      # context bundles (<name>.md)");
        println!("  ├── checkpoints/");
        println!("  └── logs/");
        println!();
        println!("Next steps:");
        println!("  1. Declare capabilities in .weft/weft.toml");
        println!("  2. Run `weft import <work-item.json>`");
        println!("  3. Run `weft run <id>`");
    } else if was_initialized {
        println!(
            "Weft project already initialized at {}",
            result.weft_dir.display()
        );
        println!("Directory structure verified.");
    }
    Ok(())
}

pub fn cmd_import(project_dir: &Path, cli: &Cli, file: &Path) -> Result<()> {
    let config = load_config(project_dir, cli)?;
    config.ensure_directories()?;

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let import: WorkItemImport = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", file.display()))?;
    let item = import.into_work_item()?;

    if let Err(problems) = DagBuilder::new(&item.tasks).build() {
        return Err(WeftError::validation(&item.id, problems).into());
    }

    let registry = config.registry();
    if registry.exists(&item.id) {
        anyhow::bail!("Work item '{}' already exists", item.id);
    }
    registry.save(&item).map_err(WeftError::Persistence)?;

    tracing::info!(work_item = %item.id, tasks = item.tasks.len(), "Work item imported");
    println!(
        "Imported {} ({} tasks) [{}]",
        style(&item.id).cyan().bold(),
        item.tasks.len(),
        item.lifecycle
    );
    Ok(())
}

pub fn cmd_list(project_dir: &Path, cli: &Cli) -> Result<()> {
    let config = load_config(project_dir, cli)?;
    let registry = config.registry();
    let ids = registry.list().map_err(WeftError::Persistence)?;

    if ids.is_empty() {
        println!("{}", style("No work items").dim());
        return Ok(());
    }
    for id in ids {
        let item = registry.load(&id).map_err(WeftError::Persistence)?;
        println!(
            "{:<24} {:<12} {}/{} tasks  {}",
            style(&item.id).cyan(),
            item.lifecycle.to_string(),
            item.completed_tasks().len(),
            item.tasks.len(),
            item.title
        );
    }
    Ok(())
}
