//! Execution planner: iterative topological layering into phases.
//!
//! Each iteration collects the not-yet-placed tasks whose dependencies were all
//! placed in earlier phases; that set, in ascending task order, becomes the next
//! phase. If an iteration places nothing while tasks remain, the graph has a cycle.
//!
//! A phase is concurrent only when concurrency is requested for it, it holds at
//! least two tasks, and no two of its tasks share an edge.

use crate::dag::builder::TaskGraph;
use crate::errors::WeftError;
use crate::work_item::TaskNumber;
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Dispatch mode of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseMode {
    /// One task at a time, in declared order.
    #[default]
    Sequential,
    /// All pending tasks dispatched together, joined at a barrier.
    Concurrent,
}

impl std::fmt::Display for PhaseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseMode::Sequential => write!(f, "sequential"),
            PhaseMode::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Which phases concurrency is requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyRequest {
    /// Every phase.
    #[default]
    Always,
    /// No phase.
    Never,
    /// Only the listed phases (1-based).
    Phases(BTreeSet<usize>),
}

impl ConcurrencyRequest {
    /// Whether concurrency is requested for the 1-based `phase`.
    pub fn requested_for(&self, phase: usize) -> bool {
        match self {
            ConcurrencyRequest::Always => true,
            ConcurrencyRequest::Never => false,
            ConcurrencyRequest::Phases(phases) => phases.contains(&phase),
        }
    }
}

impl FromStr for ConcurrencyRequest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(ConcurrencyRequest::Always),
            "never" => Ok(ConcurrencyRequest::Never),
            _ => bail!("Invalid concurrency: '{}'. Valid options: always, never", s),
        }
    }
}

/// One layer of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// 1-based position in the plan.
    pub number: usize,
    pub mode: PhaseMode,
    /// Task numbers, ascending.
    pub tasks: Vec<TaskNumber>,
}

/// Ordered phases for one run. Recomputed every run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExecutionPlan {
    pub phases: Vec<Phase>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Phase number containing `task`, if any.
    pub fn phase_of(&self, task: TaskNumber) -> Option<usize> {
        self.phases
            .iter()
            .find(|p| p.tasks.contains(&task))
            .map(|p| p.number)
    }

    /// Task numbers in plan order.
    pub fn task_order(&self) -> Vec<TaskNumber> {
        self.phases.iter().flat_map(|p| p.tasks.iter().copied()).collect()
    }
}

/// Plan phases for a validated graph.
pub fn plan(graph: &TaskGraph, concurrency: &ConcurrencyRequest) -> Result<ExecutionPlan, WeftError> {
    let mut placed: BTreeSet<TaskNumber> = BTreeSet::new();
    let mut phases = Vec::new();

    while placed.len() < graph.len() {
        let ready: Vec<TaskNumber> = graph
            .tasks()
            .filter(|t| !placed.contains(t) && graph.dependencies_satisfied(*t, &placed))
            .collect();

        if ready.is_empty() {
            let unplaced: Vec<TaskNumber> = graph.tasks().filter(|t| !placed.contains(t)).collect();
            let cycle = find_cycle(graph, &unplaced);
            return Err(WeftError::CyclicDependency { unplaced, cycle });
        }

        let number = phases.len() + 1;
        let mode = if ready.len() > 1
            && concurrency.requested_for(number)
            && !has_internal_edge(graph, &ready)
        {
            PhaseMode::Concurrent
        } else {
            PhaseMode::Sequential
        };

        placed.extend(ready.iter().copied());
        phases.push(Phase {
            number,
            mode,
            tasks: ready,
        });
    }

    tracing::debug!(phases = phases.len(), tasks = graph.len(), "Planned execution");
    Ok(ExecutionPlan { phases })
}

fn has_internal_edge(graph: &TaskGraph, tasks: &[TaskNumber]) -> bool {
    tasks.iter().enumerate().any(|(i, a)| {
        tasks[i + 1..].iter().any(|b| graph.has_edge(*a, *b))
    })
}

/// Walk from the smallest unplaced task along its smallest unplaced dependency
/// until a task repeats. Every unplaced task has at least one unplaced
/// dependency, so the walk always closes.
fn find_cycle(graph: &TaskGraph, unplaced: &[TaskNumber]) -> Vec<TaskNumber> {
    let unplaced_set: BTreeSet<TaskNumber> = unplaced.iter().copied().collect();
    let Some(&start) = unplaced.first() else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(next) = graph
            .dependencies(current)
            .filter(|d| unplaced_set.contains(d))
            .min()
        else {
            return Vec::new();
        };
        if let Some(pos) = path.iter().position(|t| *t == next) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}
