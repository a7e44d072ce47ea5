//! Read-only progress view of a work item.

use crate::dag::{ConcurrencyRequest, DagBuilder, PhaseMode, plan};
use crate::ledger::{self, LedgerEntry};
use crate::lifecycle::{HistoryRecord, LifecycleState};
use crate::orchestrator::report::PhaseOutcome;
use crate::work_item::{TaskNumber, TaskStatus, WorkItem};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseProgress {
    pub number: usize,
    pub mode: PhaseMode,
    pub tasks: Vec<TaskNumber>,
    pub completed: Vec<TaskNumber>,
    pub outcome: PhaseOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub number: TaskNumber,
    pub title: String,
    pub capability: String,
    pub status: TaskStatus,
    /// Ledger entries recorded for this task.
    pub attempts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub work_item: String,
    pub title: String,
    pub lifecycle: LifecycleState,
    pub history: Vec<HistoryRecord>,
    pub phases: Vec<PhaseProgress>,
    pub tasks: Vec<TaskProgress>,
    /// Why phases could not be derived, if the task graph is invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_error: Option<String>,
}

impl StatusReport {
    /// Combine the work item record with its ledger. Task status comes from the
    /// ledger where it has an opinion.
    pub fn build(item: &WorkItem, entries: &[LedgerEntry], concurrency: &ConcurrencyRequest) -> Self {
        let completed = ledger::completed_tasks(entries);
        let attempted: BTreeSet<TaskNumber> = entries.iter().map(|e| e.task).collect();

        let tasks = item
            .tasks
            .iter()
            .map(|task| {
                let recorded: Vec<&LedgerEntry> =
                    entries.iter().filter(|e| e.task == task.number).collect();
                let status = if completed.contains(&task.number) {
                    TaskStatus::Completed
                } else {
                    task.status
                };
                TaskProgress {
                    number: task.number,
                    title: task.title.clone(),
                    capability: task.capability.clone(),
                    status,
                    attempts: recorded.len(),
                    last_error: recorded
                        .last()
                        .filter(|e| !e.is_completed())
                        .and_then(|e| e.error.clone()),
                }
            })
            .collect();

        let (phases, plan_error) = match DagBuilder::new(&item.tasks).build() {
            Err(problems) => (Vec::new(), Some(problems.join("; "))),
            Ok(graph) => match plan(&graph, concurrency) {
                Err(e) => (Vec::new(), Some(e.to_string())),
                Ok(plan) => (
                    plan.phases
                        .iter()
                        .map(|phase| {
                            let done: Vec<TaskNumber> = phase
                                .tasks
                                .iter()
                                .copied()
                                .filter(|t| completed.contains(t))
                                .collect();
                            let outcome = if done.len() == phase.tasks.len() {
                                PhaseOutcome::Completed
                            } else if phase.tasks.iter().any(|t| attempted.contains(t)) {
                                PhaseOutcome::PartiallyCompleted
                            } else {
                                PhaseOutcome::NotStarted
                            };
                            PhaseProgress {
                                number: phase.number,
                                mode: phase.mode,
                                tasks: phase.tasks.clone(),
                                completed: done,
                                outcome,
                            }
                        })
                        .collect(),
                    None,
                ),
            },
        };

        Self {
            work_item: item.id.clone(),
            title: item.title.clone(),
            lifecycle: item.lifecycle,
            history: item.history.clone(),
            phases,
            tasks,
            plan_error,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{EntryStatus, entry};
    use crate::work_item::Task;

    fn item() -> WorkItem {
        WorkItem::new(
            "W1",
            "Export",
            vec![
                Task::new(1, "Write reader", "code"),
                Task::new(2, "Write writer", "code"),
                Task::new(3, "Wire command", "code").with_dependencies([1, 2]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_phase_progress_from_ledger() {
        let mut failed = entry("W1", 1, EntryStatus::Failed);
        failed.error = Some("borrow checker".into());
        let entries = vec![failed, entry("W1", 2, EntryStatus::Completed)];

        let status = StatusReport::build(&item(), &entries, &ConcurrencyRequest::Always);

        assert_eq!(status.phases.len(), 2);
        assert_eq!(status.phases[0].outcome, PhaseOutcome::PartiallyCompleted);
        assert_eq!(status.phases[0].completed, vec![2]);
        assert_eq!(status.phases[1].outcome, PhaseOutcome::NotStarted);
        assert_eq!(status.tasks[0].last_error.as_deref(), Some("borrow checker"));
        assert_eq!(status.tasks[1].status, TaskStatus::Completed);
        assert_eq!(status.completed_count(), 1);
        assert!(status.plan_error.is_none());
    }

    #[test]
    fn test_cycle_reported_as_plan_error() {
        let item = WorkItem::new(
            "W2",
            "Loop",
            vec![
                Task::new(1, "A", "code").with_dependencies([2]),
                Task::new(2, "B", "code").with_dependencies([1]),
            ],
        )
        .unwrap();

        let status = StatusReport::build(&item, &[], &ConcurrencyRequest::Always);
        assert!(status.phases.is_empty());
        assert!(status.plan_error.unwrap().contains("cycle"));
    }
}
