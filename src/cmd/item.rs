//! Per-work-item commands: validate, plan, status, transition, summarize, ledger.

use anyhow::Result;
use std::path::Path;
use weft::atomicity;
use weft::config::Config;
use weft::dag::{ConcurrencyRequest, DagBuilder, plan};
use weft::errors::WeftError;
use weft::ledger::LedgerStore;
use weft::lifecycle::{self, LifecycleState, Trigger};
use weft::orchestrator::StatusReport;
use weft::ui::report::{render_atomicity, render_ledger, render_plan, render_status};
use weft::work_item::{WorkItem, WorkItemRegistry};

use super::super::Cli;
use super::load_config;

fn load_item(config: &Config, id: &str) -> Result<WorkItem> {
    Ok(config.registry().load(id).map_err(WeftError::Persistence)?)
}

pub fn cmd_validate(project_dir: &Path, cli: &Cli, id: &str, threshold: Option<u8>) -> Result<()> {
    let config = load_config(project_dir, cli)?;
    let threshold = threshold.unwrap_or_else(|| config.settings.threshold());
    let mut item = load_item(&config, id)?;

    let mut problems = Vec::new();
    for task in item.tasks.iter_mut() {
        let report = atomicity::score_task(task);
        task.atomicity_score = Some(report.score);
        print!("{}", render_atomicity(task, &report, threshold));
        if !report.passes(threshold) {
            problems.push(format!(
                "Task {} scores {} ({}), below threshold {}",
                task.number, report.score, report.classification, threshold
            ));
        }
    }
    config.registry().save(&item).map_err(WeftError::Persistence)?;

    if problems.is_empty() {
        println!("All {} tasks meet threshold {}", item.tasks.len(), threshold);
        Ok(())
    } else {
        Err(WeftError::validation(id, problems).into())
    }
}

pub fn cmd_plan(
    project_dir: &Path,
    cli: &Cli,
    id: &str,
    concurrent: bool,
    sequential: bool,
) -> Result<()> {
    let config = load_config(project_dir, cli)?;
    let item = load_item(&config, id)?;

    let request = if concurrent {
        ConcurrencyRequest::Always
    } else if sequential {
        ConcurrencyRequest::Never
    } else {
        config.settings.concurrency()
    };

    let graph = DagBuilder::new(&item.tasks)
        .build()
        .map_err(|problems| WeftError::validation(id, problems))?;
    let plan = plan(&graph, &request)?;
    print!("{}", render_plan(id, &plan));
    Ok(())
}

pub fn cmd_status(project_dir: &Path, cli: &Cli, id: &str, json: bool) -> Result<()> {
    let config = load_config(project_dir, cli)?;
    let item = load_item(&config, id)?;
    let entries = config.ledger().entries(id).map_err(WeftError::Persistence)?;

    let status = StatusReport::build(&item, &entries, &config.settings.concurrency());
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", render_status(&status));
    }
    Ok(())
}

/// Apply a lifecycle change after snapshotting the current state. Nothing is
/// written if the change is illegal.
fn apply_transition(
    config: &Config,
    id: &str,
    target: LifecycleState,
    trigger: Trigger,
    note: Option<&str>,
) -> Result<LifecycleState> {
    let registry = config.registry();
    let mut item = load_item(config, id)?;
    let from = item.lifecycle;
    lifecycle::transition(&mut item, target, trigger, note.map(str::to_string))?;

    let checkpoint = config
        .checkpoints()
        .create(&registry, &config.ledger(), id, &format!("transition {} -> {}", from, target))
        .map_err(WeftError::Persistence)?;
    registry.save(&item).map_err(WeftError::Persistence)?;

    tracing::info!(work_item = id, %from, to = %target, checkpoint = %checkpoint.id, "Lifecycle changed");
    Ok(from)
}

pub fn cmd_transition(
    project_dir: &Path,
    cli: &Cli,
    id: &str,
    state: &str,
    note: Option<&str>,
) -> Result<()> {
    let config = load_config(project_dir, cli)?;
    config.ensure_directories()?;
    let target: LifecycleState = state.parse()?;

    let from = apply_transition(&config, id, target, Trigger::Manual, note)?;
    println!("{}: {} -> {}", id, from, target);
    Ok(())
}

pub fn cmd_summarize(project_dir: &Path, cli: &Cli, id: &str, note: Option<&str>) -> Result<()> {
    let config = load_config(project_dir, cli)?;
    config.ensure_directories()?;

    apply_transition(&config, id, LifecycleState::Summarized, Trigger::Automatic, note)?;
    println!("{}: summarized", id);
    Ok(())
}

pub fn cmd_ledger(project_dir: &Path, cli: &Cli, id: &str, json: bool) -> Result<()> {
    let config = load_config(project_dir, cli)?;
    // Surface a missing work item rather than an empty ledger.
    load_item(&config, id)?;
    let entries = config.ledger().entries(id).map_err(WeftError::Persistence)?;

    if json {
        for entry in &entries {
            println!("{}", serde_json::to_string(entry)?);
        }
    } else {
        print!("{}", render_ledger(&entries));
    }
    Ok(())
}
