//! Structured run reports.

use crate::dag::PhaseMode;
use crate::errors::{NextAction, WeftError};
use crate::ledger::LedgerEntry;
use crate::lifecycle::LifecycleState;
use crate::work_item::TaskNumber;
use serde::{Deserialize, Serialize};

/// Outcome of a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseOutcome {
    #[default]
    NotStarted,
    /// Dispatched, but the outcomes were never recorded.
    Running,
    Completed,
    PartiallyCompleted,
}

impl std::fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseOutcome::NotStarted => write!(f, "NOT_STARTED"),
            PhaseOutcome::Running => write!(f, "RUNNING"),
            PhaseOutcome::Completed => write!(f, "COMPLETED"),
            PhaseOutcome::PartiallyCompleted => write!(f, "PARTIALLY_COMPLETED"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every phase completed.
    #[default]
    Completed,
    /// A phase partially completed; later phases were not attempted.
    Halted,
    /// A fatal error stopped the run mid-phase.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub number: usize,
    pub mode: PhaseMode,
    pub tasks: Vec<TaskNumber>,
    /// Tasks actually dispatched this run (pending at phase start).
    pub dispatched: Vec<TaskNumber>,
    pub outcome: PhaseOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTask {
    pub task: TaskNumber,
    pub error: String,
}

/// Everything an operator needs after a run: what succeeded, what failed and
/// why, what was never attempted, and the one thing to do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub work_item: String,
    pub status: RunStatus,
    pub lifecycle: LifecycleState,
    pub phases: Vec<PhaseReport>,
    /// Completed in an earlier run and excluded by the resume check.
    pub previously_completed: Vec<TaskNumber>,
    pub succeeded: Vec<TaskNumber>,
    pub failed: Vec<FailedTask>,
    /// Never attempted because the run halted first.
    pub skipped: Vec<TaskNumber>,
    /// Results that were produced but could not be written to the ledger.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unrecorded: Vec<LedgerEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<NextAction>,
}

impl RunReport {
    pub fn new(work_item: &str) -> Self {
        Self {
            work_item: work_item.to_string(),
            status: RunStatus::Completed,
            lifecycle: LifecycleState::Planned,
            phases: Vec::new(),
            previously_completed: Vec::new(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            unrecorded: Vec::new(),
            halted_at: None,
            next_action: None,
        }
    }

    /// Total tasks dispatched across all phases in this run.
    pub fn dispatched(&self) -> usize {
        self.phases.iter().map(|p| p.dispatched.len()).sum()
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// The error that describes a halted run, for exit-code mapping.
    pub fn halt_error(&self) -> Option<WeftError> {
        match (self.status, self.halted_at) {
            (RunStatus::Halted, Some(phase)) => Some(WeftError::TaskExecution {
                work_item: self.work_item.clone(),
                phase,
                failed: self.failed.iter().map(|f| f.task).collect(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report_is_empty_success() {
        let report = RunReport::new("W1");
        assert!(report.is_success());
        assert_eq!(report.dispatched(), 0);
        assert!(report.halt_error().is_none());
    }

    #[test]
    fn test_halted_report_maps_to_task_execution() {
        let mut report = RunReport::new("W1");
        report.status = RunStatus::Halted;
        report.halted_at = Some(1);
        report.failed.push(FailedTask {
            task: 2,
            error: "boom".into(),
        });
        let err = report.halt_error().unwrap();
        assert_eq!(err.exit_code(), 5);
        assert_eq!(err.next_action(), NextAction::FixAndResume);
    }

    #[test]
    fn test_phase_outcome_serializes_upper_case() {
        let json = serde_json::to_string(&PhaseOutcome::PartiallyCompleted).unwrap();
        assert_eq!(json, r#""PARTIALLY_COMPLETED""#);
    }
}
