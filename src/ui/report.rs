//! Text rendering for plans, run reports, status and ledgers.

use crate::atomicity::{AtomicityReport, Classification};
use crate::checkpoint::CheckpointSummary;
use crate::dag::ExecutionPlan;
use crate::ledger::LedgerEntry;
use crate::orchestrator::{PhaseOutcome, RunReport, RunStatus, StatusReport};
use crate::ui::icons::{BLOCKER, CHECK, CROSS, FILE_DEL, FILE_MOD, FILE_NEW, SKIP, SPARKLE};
use crate::work_item::{Task, TaskNumber, TaskStatus};
use console::style;
use std::fmt::Write;

fn numbers(tasks: &[TaskNumber]) -> String {
    if tasks.is_empty() {
        return "-".to_string();
    }
    tasks
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render_plan(work_item: &str, plan: &ExecutionPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} ({} phases)",
        style("Plan for").bold(),
        style(work_item).cyan().bold(),
        plan.len()
    );
    for phase in &plan.phases {
        let _ = writeln!(
            out,
            "  Phase {} [{}]: {}",
            style(phase.number).yellow(),
            phase.mode,
            numbers(&phase.tasks)
        );
    }
    out
}

pub fn render_atomicity(task: &Task, report: &AtomicityReport, threshold: u8) -> String {
    let mut out = String::new();
    let class = match report.classification {
        Classification::Excellent | Classification::Good => {
            style(report.classification.to_string()).green()
        }
        Classification::NeedsReview => style(report.classification.to_string()).yellow(),
        Classification::MustSplit => style(report.classification.to_string()).red(),
    };
    let icon = if report.passes(threshold) { CHECK } else { CROSS };
    let _ = writeln!(
        out,
        "{}Task {}: {} {} ({})",
        icon,
        task.number,
        style(report.score).bold(),
        class,
        task.title
    );
    let _ = writeln!(
        out,
        "     ~{} files, ~{} min",
        report.estimated_files, report.estimated_minutes
    );
    for violation in &report.violations {
        let _ = writeln!(
            out,
            "     {} -{} {}",
            style("•").dim(),
            violation.penalty,
            violation.message
        );
    }
    out
}

pub fn render_run_report(report: &RunReport) -> String {
    let mut out = String::new();
    let headline = match report.status {
        RunStatus::Completed => format!("{}{}", SPARKLE, style("Run completed").green().bold()),
        RunStatus::Halted => format!("{}{}", BLOCKER, style("Run halted").yellow().bold()),
        RunStatus::Aborted => format!("{}{}", CROSS, style("Run aborted").red().bold()),
    };
    let _ = writeln!(out, "{} {} [{}]", headline, report.work_item, report.lifecycle);

    for phase in &report.phases {
        let icon = match phase.outcome {
            PhaseOutcome::Completed if phase.dispatched.is_empty() => SKIP,
            PhaseOutcome::Completed => CHECK,
            _ => CROSS,
        };
        let _ = writeln!(
            out,
            "  {}Phase {} [{}] {}: dispatched {}",
            icon,
            phase.number,
            phase.mode,
            phase.outcome,
            numbers(&phase.dispatched)
        );
    }

    if !report.previously_completed.is_empty() {
        let _ = writeln!(
            out,
            "  Previously completed: {}",
            numbers(&report.previously_completed)
        );
    }
    let _ = writeln!(out, "  Succeeded: {}", numbers(&report.succeeded));
    if !report.failed.is_empty() {
        let _ = writeln!(out, "  Failed:");
        for failed in &report.failed {
            let _ = writeln!(out, "    task {}: {}", failed.task, style(&failed.error).red());
        }
    }
    if !report.skipped.is_empty() {
        let _ = writeln!(out, "  Not attempted: {}", numbers(&report.skipped));
    }
    if !report.unrecorded.is_empty() {
        let _ = writeln!(
            out,
            "  {} results were not written to the ledger:",
            style(report.unrecorded.len()).red().bold()
        );
        for entry in &report.unrecorded {
            let _ = writeln!(out, "    task {}: {:?}", entry.task, entry.status);
        }
    }
    if let Some(action) = report.next_action {
        let _ = writeln!(out, "  Next action: {}", style(action).cyan().bold());
    }
    out
}

pub fn render_status(status: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} [{}]",
        style(&status.work_item).cyan().bold(),
        status.title,
        style(status.lifecycle).yellow()
    );
    let _ = writeln!(
        out,
        "  Tasks: {}/{} completed",
        status.completed_count(),
        status.tasks.len()
    );

    if let Some(ref error) = status.plan_error {
        let _ = writeln!(out, "  {}Plan unavailable: {}", CROSS, error);
    }
    for phase in &status.phases {
        let _ = writeln!(
            out,
            "  Phase {} [{}] {}: {}/{} ({})",
            phase.number,
            phase.mode,
            phase.outcome,
            phase.completed.len(),
            phase.tasks.len(),
            numbers(&phase.tasks)
        );
    }

    for task in &status.tasks {
        let marker = match task.status {
            TaskStatus::Completed => style("✓").green(),
            TaskStatus::Partial => style("◐").yellow(),
            TaskStatus::Blocked => style("✗").red(),
            TaskStatus::Pending => style("·").dim(),
        };
        let _ = write!(
            out,
            "    {} {} {} [{}]",
            marker, task.number, task.title, task.capability
        );
        if let Some(ref error) = task.last_error {
            let _ = write!(out, " {}", style(error).red());
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "  History:");
    for record in &status.history {
        let _ = write!(
            out,
            "    {} {} ({:?})",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.state,
            record.trigger
        );
        if let Some(ref note) = record.note {
            let _ = write!(out, " {}", note);
        }
        let _ = writeln!(out);
    }
    out
}

pub fn render_ledger(entries: &[LedgerEntry]) -> String {
    let mut out = String::new();
    if entries.is_empty() {
        let _ = writeln!(out, "{}", style("Ledger is empty").dim());
        return out;
    }
    for entry in entries {
        let icon = if entry.is_completed() { CHECK } else { CROSS };
        let _ = writeln!(
            out,
            "{}{} task {} {:?}",
            icon,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.task,
            entry.status
        );
        for file in &entry.files_created {
            let _ = writeln!(out, "     {}{}", FILE_NEW, file);
        }
        for file in &entry.files_modified {
            let _ = writeln!(out, "     {}{}", FILE_MOD, file);
        }
        for file in &entry.files_deleted {
            let _ = writeln!(out, "     {}{}", FILE_DEL, file);
        }
        for decision in &entry.decisions {
            let _ = writeln!(out, "     decided {}: {}", decision.choice, decision.rationale);
        }
        if let Some(ref error) = entry.error {
            let _ = writeln!(out, "     {}", style(error).red());
        }
    }
    out
}

pub fn render_checkpoints(checkpoints: &[CheckpointSummary]) -> String {
    let mut out = String::new();
    if checkpoints.is_empty() {
        let _ = writeln!(out, "{}", style("No checkpoints").dim());
        return out;
    }
    for checkpoint in checkpoints {
        let _ = writeln!(
            out,
            "{} {} {} ({} ledger entries) {}",
            style(checkpoint.id).cyan(),
            checkpoint.created_at.format("%Y-%m-%d %H:%M:%S"),
            checkpoint.work_item,
            checkpoint.ledger_entries,
            style(&checkpoint.operation).dim()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{Phase, PhaseMode};
    use crate::errors::NextAction;
    use crate::orchestrator::{FailedTask, PhaseReport};
    use console::strip_ansi_codes;

    #[test]
    fn test_render_plan_lists_phases() {
        let plan = ExecutionPlan {
            phases: vec![
                Phase {
                    number: 1,
                    mode: PhaseMode::Concurrent,
                    tasks: vec![1, 2],
                },
                Phase {
                    number: 2,
                    mode: PhaseMode::Sequential,
                    tasks: vec![3],
                },
            ],
        };
        let text = strip_ansi_codes(&render_plan("W1", &plan)).to_string();
        assert!(text.contains("Phase 1 [concurrent]: 1, 2"));
        assert!(text.contains("Phase 2 [sequential]: 3"));
    }

    #[test]
    fn test_render_halted_report() {
        let mut report = RunReport::new("W1");
        report.status = RunStatus::Halted;
        report.phases.push(PhaseReport {
            number: 1,
            mode: PhaseMode::Concurrent,
            tasks: vec![1, 2],
            dispatched: vec![1, 2],
            outcome: PhaseOutcome::PartiallyCompleted,
        });
        report.succeeded = vec![2];
        report.failed = vec![FailedTask {
            task: 1,
            error: "tests failed".into(),
        }];
        report.skipped = vec![3];
        report.next_action = Some(NextAction::FixAndResume);

        let text = strip_ansi_codes(&render_run_report(&report)).to_string();
        assert!(text.contains("Run halted"));
        assert!(text.contains("PARTIALLY_COMPLETED"));
        assert!(text.contains("task 1: tests failed"));
        assert!(text.contains("Not attempted: 3"));
        assert!(text.contains("Next action: fix-and-resume"));
    }

    #[test]
    fn test_render_empty_ledger() {
        let text = strip_ansi_codes(&render_ledger(&[])).to_string();
        assert!(text.contains("Ledger is empty"));
    }
}
