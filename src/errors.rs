//! Typed error hierarchy for the weft engine.
//!
//! `WeftError` carries the engine's failure taxonomy. Each variant maps to exactly
//! one process exit code and one recommended next action.
//!
//! Pre-dispatch errors (`Validation`, `CyclicDependency`, `StateTransition`) are
//! raised before anything touches the ledger. `LedgerWrite`, `ResourceUnavailable`
//! and `StateSave` are fatal mid-run and carry the run report up to that point;
//! the engine never retries them itself.

use crate::lifecycle::LifecycleState;
use crate::orchestrator::RunReport;
use crate::work_item::TaskNumber;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The single follow-up a halted run recommends to its operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    /// Nothing needs fixing; running again is expected to succeed.
    Retry,
    /// Fix the reported problem, then `run --resume`.
    FixAndResume,
    /// The request itself is wrong for this work item; stop.
    Abort,
}

impl std::fmt::Display for NextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NextAction::Retry => write!(f, "retry"),
            NextAction::FixAndResume => write!(f, "fix-and-resume"),
            NextAction::Abort => write!(f, "abort"),
        }
    }
}

/// Errors raised by the orchestration engine.
#[derive(Debug, Error)]
pub enum WeftError {
    #[error("Validation failed for work item {work_item}: {}", .problems.join("; "))]
    Validation {
        work_item: String,
        problems: Vec<String>,
    },

    #[error(
        "Dependency cycle detected; unplaced tasks: {} (cycle: {})",
        join_numbers(.unplaced, ", "),
        join_numbers(.cycle, " -> ")
    )]
    CyclicDependency {
        /// Every task the planner could not place.
        unplaced: Vec<TaskNumber>,
        /// One concrete cycle among the unplaced tasks, first task repeated at the end.
        cycle: Vec<TaskNumber>,
    },

    #[error(
        "Illegal lifecycle transition {from} -> {requested}; legal next states: {}",
        join_states(.allowed)
    )]
    StateTransition {
        from: LifecycleState,
        requested: LifecycleState,
        allowed: Vec<LifecycleState>,
    },

    #[error(
        "Phase {phase} of {work_item} partially completed; failed tasks: {}",
        join_numbers(.failed, ", ")
    )]
    TaskExecution {
        work_item: String,
        phase: usize,
        failed: Vec<TaskNumber>,
    },

    #[error("Failed to record ledger batch for phase {phase} of {work_item}: {source}")]
    LedgerWrite {
        work_item: String,
        phase: usize,
        #[source]
        source: anyhow::Error,
        /// Run state at the moment of failure; `unrecorded` holds the lost results.
        report: Box<RunReport>,
    },

    #[error("Context bundle '{bundle}' unavailable for phase {phase}: {reason}")]
    ResourceUnavailable {
        phase: usize,
        bundle: String,
        reason: String,
        /// Set by the orchestrator when the bundle blocked a run.
        report: Option<Box<RunReport>>,
    },

    #[error("Failed to save work item {work_item} after phase {phase}: {source}")]
    StateSave {
        work_item: String,
        phase: usize,
        #[source]
        source: anyhow::Error,
        /// Run state at the moment of failure. Ledger entries up to `phase` are durable.
        report: Box<RunReport>,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WeftError {
    pub fn validation(work_item: &str, problems: Vec<String>) -> Self {
        WeftError::Validation {
            work_item: work_item.to_string(),
            problems,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            WeftError::Validation { .. } => 2,
            WeftError::CyclicDependency { .. } => 3,
            WeftError::StateTransition { .. } => 4,
            WeftError::TaskExecution { .. } => 5,
            WeftError::LedgerWrite { .. } => 6,
            WeftError::ResourceUnavailable { .. } => 7,
            WeftError::Persistence(_) | WeftError::StateSave { .. } => 8,
            WeftError::Other(_) => 1,
        }
    }

    /// The one recommended follow-up for this error.
    pub fn next_action(&self) -> NextAction {
        match self {
            WeftError::Validation { .. }
            | WeftError::CyclicDependency { .. }
            | WeftError::TaskExecution { .. } => NextAction::FixAndResume,
            WeftError::StateTransition { .. } => NextAction::Abort,
            WeftError::LedgerWrite { .. }
            | WeftError::ResourceUnavailable { .. }
            | WeftError::StateSave { .. }
            | WeftError::Persistence(_)
            | WeftError::Other(_) => NextAction::Retry,
        }
    }

    /// The partial run report a fatal mid-run error carries.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            WeftError::LedgerWrite { report, .. } | WeftError::StateSave { report, .. } => {
                Some(report.as_ref())
            }
            WeftError::ResourceUnavailable { report, .. } => report.as_deref(),
            _ => None,
        }
    }

    /// Whether the error was raised before any task was dispatched.
    pub fn is_pre_dispatch(&self) -> bool {
        matches!(
            self,
            WeftError::Validation { .. }
                | WeftError::CyclicDependency { .. }
                | WeftError::StateTransition { .. }
        )
    }
}

fn join_numbers(numbers: &[TaskNumber], sep: &str) -> String {
    numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

fn join_states(states: &[LifecycleState]) -> String {
    if states.is_empty() {
        return "none".to_string();
    }
    states
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
