//! Live progress for `weft run`.
//!
//! Consumes [`RunEvent`]s from the orchestrator's channel. Three output modes:
//! - `full`: header bar over phases plus one spinner per dispatched task
//! - `minimal`: one line per phase and task outcome
//! - `json`: one JSON event per line

use crate::orchestrator::{PhaseOutcome, RunEvent, RunStatus};
use crate::ui::icons::{CHECK, CROSS, LIFECYCLE, PHASE, RUNNING, SKIP, SPARKLE};
use crate::work_item::TaskNumber;
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

/// Output mode for run progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    #[default]
    Full,
    Minimal,
    Json,
}

impl std::str::FromStr for UiMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "minimal" => Ok(Self::Minimal),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Invalid UI mode '{}'. Valid values: full, minimal, json", s),
        }
    }
}

pub struct RunUI {
    mode: UiMode,
    multi: MultiProgress,
    header_bar: Option<ProgressBar>,
    task_bars: BTreeMap<TaskNumber, ProgressBar>,
    verbose: bool,
    term: Term,
}

impl RunUI {
    pub fn new(mode: UiMode, verbose: bool) -> Self {
        Self {
            mode,
            multi: MultiProgress::new(),
            header_bar: None,
            task_bars: BTreeMap::new(),
            verbose,
            term: Term::stdout(),
        }
    }

    pub fn handle_event(&mut self, event: &RunEvent) {
        match self.mode {
            UiMode::Json => self.handle_json(event),
            UiMode::Minimal => self.handle_minimal(event),
            UiMode::Full => self.handle_full(event),
        }
    }

    fn handle_json(&self, event: &RunEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(&self.term, "{}", json);
        }
    }

    fn handle_minimal(&self, event: &RunEvent) {
        let line = match event {
            RunEvent::PhaseStarted {
                phase,
                mode,
                pending,
            } => format!("Phase {} ({}): {}", phase, mode, join(pending)),
            RunEvent::PhaseSkipped { phase } => format!("Phase {}: already complete", phase),
            RunEvent::TaskFinished {
                task,
                success: true,
                ..
            } => format!("✓ task {}", task),
            RunEvent::TaskFinished {
                task,
                success: false,
                error,
                ..
            } => format!("✗ task {} ({})", task, error.as_deref().unwrap_or("failed")),
            RunEvent::PhaseFinished { phase, outcome } => format!("Phase {}: {}", phase, outcome),
            RunEvent::RunFinished { status } => format!("Done: {:?}", status).to_lowercase(),
            _ => return,
        };
        let _ = writeln!(&self.term, "{}", line);
    }

    fn handle_full(&mut self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted {
                work_item,
                phases,
                pending,
            } => self.on_run_started(work_item, *phases, *pending),
            RunEvent::PhaseSkipped { phase } => {
                self.println(format!(
                    "{}Phase {} {}",
                    SKIP,
                    style(phase).yellow().bold(),
                    style("already complete").dim()
                ));
                self.advance_header();
            }
            RunEvent::PhaseStarted {
                phase,
                mode,
                pending,
            } => {
                self.println(String::new());
                self.println(format!(
                    "{}{} Phase {} ({}): {}",
                    PHASE,
                    style("═".repeat(40)).cyan(),
                    style(phase).yellow().bold(),
                    mode,
                    style(join(pending)).dim()
                ));
                if let Some(ref bar) = self.header_bar {
                    bar.set_message(format!("phase {}", phase));
                }
            }
            RunEvent::TaskDispatched { task, .. } => self.on_task_dispatched(*task),
            RunEvent::TaskFinished {
                task,
                success,
                error,
                ..
            } => self.on_task_finished(*task, *success, error.as_deref()),
            RunEvent::PhaseFinished { phase, outcome } => {
                let (icon, text) = match outcome {
                    PhaseOutcome::Completed => (CHECK, style(outcome.to_string()).green()),
                    _ => (CROSS, style(outcome.to_string()).red()),
                };
                self.println(format!("{}Phase {} {}", icon, phase, text));
                self.advance_header();
            }
            RunEvent::LifecycleChanged { from, to } => {
                if self.verbose {
                    self.println(format!(
                        "{}Lifecycle {} -> {}",
                        LIFECYCLE,
                        style(from).dim(),
                        style(to).cyan()
                    ));
                }
            }
            RunEvent::RunFinished { status } => self.on_run_finished(*status),
        }
    }

    fn on_run_started(&mut self, work_item: &str, phases: usize, pending: usize) {
        let header_style = ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("█▓▒░");
        let bar = self.multi.add(ProgressBar::new(phases as u64));
        bar.set_style(header_style);
        bar.set_prefix(work_item.to_string());
        bar.set_message(format!("{} pending tasks", pending));
        self.header_bar = Some(bar);
    }

    fn on_task_dispatched(&mut self, task: TaskNumber) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner} {prefix:.bold} {msg}")
                .unwrap(),
        );
        bar.set_prefix(format!("task {}", task));
        bar.set_message(format!("{}running", RUNNING));
        bar.enable_steady_tick(Duration::from_millis(100));
        self.task_bars.insert(task, bar);
    }

    fn on_task_finished(&mut self, task: TaskNumber, success: bool, error: Option<&str>) {
        let Some(bar) = self.task_bars.remove(&task) else {
            return;
        };
        if success {
            bar.finish_with_message(format!("{}{}", CHECK, style("done").green()));
        } else {
            bar.finish_with_message(format!(
                "{}{}: {}",
                CROSS,
                style("failed").red(),
                error.unwrap_or("unknown error")
            ));
        }
    }

    fn on_run_finished(&mut self, status: RunStatus) {
        for (_, bar) in std::mem::take(&mut self.task_bars) {
            bar.finish_and_clear();
        }
        if let Some(bar) = self.header_bar.take() {
            bar.finish_and_clear();
        }
        let line = match status {
            RunStatus::Completed => format!("{}Run {}", SPARKLE, style("COMPLETE").green().bold()),
            RunStatus::Halted => format!("{}Run {}", CROSS, style("HALTED").yellow().bold()),
            RunStatus::Aborted => format!("{}Run {}", CROSS, style("ABORTED").red().bold()),
        };
        self.println(String::new());
        self.println(line);
    }

    fn advance_header(&self) {
        if let Some(ref bar) = self.header_bar {
            bar.inc(1);
        }
    }

    fn println(&self, line: String) {
        self.multi.println(line).ok();
    }
}

fn join(tasks: &[TaskNumber]) -> String {
    tasks
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
