//! `weft run <id>`: drive a work item through its phases.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use weft::dag::ConcurrencyRequest;
use weft::orchestrator::{Orchestrator, RunEvent, RunReport};
use weft::ui::report::render_run_report;
use weft::ui::{RunUI, UiMode};

use super::super::Cli;
use super::load_config;

pub struct RunOptions<'a> {
    pub id: &'a str,
    pub resume: bool,
    pub ui: &'a str,
    pub threshold: Option<u8>,
    pub sequential: bool,
}

pub async fn cmd_run(project_dir: &Path, cli: &Cli, opts: RunOptions<'_>) -> Result<()> {
    let ui_mode: UiMode = opts.ui.parse()?;
    let mut config = load_config(project_dir, cli)?;
    config.ensure_directories()?;

    config.settings.cli_threshold = opts.threshold;
    if opts.sequential {
        config.settings.cli_concurrency = Some(ConcurrencyRequest::Never);
    }

    let toml = &config.settings.toml;
    let (event_tx, mut event_rx) = mpsc::channel::<RunEvent>(100);
    let orchestrator = Orchestrator::new(
        Arc::new(config.registry()),
        Arc::new(config.ledger()),
        toml.capability_registry(&config.project_dir),
    )
    .with_bundles(Arc::new(config.bundle_source()), toml.bundle_catalog())
    .with_settings(config.settings.run_settings())
    .with_event_channel(event_tx);

    let verbose = cli.verbose;
    let display_handle = tokio::spawn(async move {
        let mut ui = RunUI::new(ui_mode, verbose);
        while let Some(event) = event_rx.recv().await {
            ui.handle_event(&event);
        }
    });

    let result = orchestrator.run(opts.id, opts.resume).await;
    // Closing the channel lets the display task drain and exit.
    drop(orchestrator);
    display_handle.await.ok();

    match result {
        Ok(report) => {
            print_report(&report, ui_mode)?;
            match report.halt_error() {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        }
        Err(err) => {
            if let Some(report) = err.report() {
                print_report(report, ui_mode)?;
            }
            Err(err.into())
        }
    }
}

fn print_report(report: &RunReport, mode: UiMode) -> Result<()> {
    match mode {
        UiMode::Json => println!("{}", serde_json::to_string(report)?),
        _ => {
            println!();
            print!("{}", render_run_report(report));
        }
    }
    Ok(())
}
