use crate::dag::PhaseMode;
use crate::lifecycle::LifecycleState;
use crate::orchestrator::report::{PhaseOutcome, RunStatus};
use crate::work_item::TaskNumber;
use serde::{Deserialize, Serialize};

/// Events emitted while a run progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The plan is built and admission passed.
    RunStarted {
        work_item: String,
        phases: usize,
        pending: usize,
    },
    /// Nothing pending in this phase; it counts as completed.
    PhaseSkipped { phase: usize },
    PhaseStarted {
        phase: usize,
        mode: PhaseMode,
        pending: Vec<TaskNumber>,
    },
    TaskDispatched { phase: usize, task: TaskNumber },
    TaskFinished {
        phase: usize,
        task: TaskNumber,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    PhaseFinished { phase: usize, outcome: PhaseOutcome },
    LifecycleChanged {
        from: LifecycleState,
        to: LifecycleState,
    },
    RunFinished { status: RunStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_tagged() {
        let json = serde_json::to_string(&RunEvent::TaskDispatched { phase: 1, task: 3 }).unwrap();
        assert_eq!(json, r#"{"type":"task_dispatched","phase":1,"task":3}"#);

        let parsed: RunEvent =
            serde_json::from_str(r#"{"type":"phase_finished","phase":2,"outcome":"COMPLETED"}"#)
                .unwrap();
        assert_eq!(
            parsed,
            RunEvent::PhaseFinished {
                phase: 2,
                outcome: PhaseOutcome::Completed
            }
        );
    }
}
