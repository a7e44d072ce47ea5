//! Work items and the tasks they decompose into.
//!
//! A [`WorkItem`] is created by an external decomposition step and handed to the
//! engine through a [`WorkItemRegistry`]. Only the orchestrator mutates task status,
//! and only after the corresponding ledger batch has been written.

pub(crate) mod registry;

pub use registry::{FileWorkItemRegistry, MemoryWorkItemRegistry, WorkItemRegistry};

use crate::lifecycle::{HistoryRecord, LifecycleState, Trigger};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Task number, unique within a work item.
pub type TaskNumber = u32;

static WORK_ITEM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Execution status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Never dispatched, or dispatched but not yet recorded.
    #[default]
    Pending,
    /// Recorded as completed in the ledger.
    Completed,
    /// Failed after producing some file changes.
    Partial,
    /// Failed without producing anything.
    Blocked,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Partial => write!(f, "partial"),
            TaskStatus::Blocked => write!(f, "blocked"),
        }
    }
}

/// An atomic unit of work assigned to one capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub number: TaskNumber,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Identifier of the capability provider that executes this task.
    pub capability: String,
    #[serde(default)]
    pub dependencies: BTreeSet<TaskNumber>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Last score written by `validate`; `None` until scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atomicity_score: Option<u8>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl Task {
    pub fn new(number: TaskNumber, title: &str, capability: &str) -> Self {
        Self {
            number,
            title: title.to_string(),
            description: String::new(),
            capability: capability.to_string(),
            dependencies: BTreeSet::new(),
            acceptance_criteria: Vec::new(),
            atomicity_score: None,
            status: TaskStatus::Pending,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = TaskNumber>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }

    pub fn with_criteria(mut self, criteria: &[&str]) -> Self {
        self.acceptance_criteria = criteria.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Title and description joined, for keyword matching.
    pub fn text(&self) -> String {
        format!("{}\n{}", self.title, self.description)
    }
}

/// A feature or bug-fix unit decomposed into tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub lifecycle: LifecycleState,
    /// Append-only record of every accepted lifecycle transition.
    pub history: Vec<HistoryRecord>,
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_summarized: bool,
}

impl WorkItem {
    /// Create a planned work item with its initial creation record.
    pub fn new(id: &str, title: &str, tasks: Vec<Task>) -> Result<Self> {
        validate_id(id)?;
        let now = Utc::now();
        Ok(Self {
            id: id.to_string(),
            title: title.to_string(),
            created_at: now,
            lifecycle: LifecycleState::Planned,
            history: vec![HistoryRecord {
                state: LifecycleState::Planned,
                timestamp: now,
                trigger: Trigger::Created,
                note: None,
            }],
            tasks,
            completed_at: None,
            is_summarized: false,
        })
    }

    pub fn task(&self, number: TaskNumber) -> Option<&Task> {
        self.tasks.iter().find(|t| t.number == number)
    }

    pub fn task_mut(&mut self, number: TaskNumber) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.number == number)
    }

    /// Numbers of tasks whose status is `completed`.
    pub fn completed_tasks(&self) -> BTreeSet<TaskNumber> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.number)
            .collect()
    }
}

/// Import format for a work item decomposed outside the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemImport {
    pub id: String,
    pub title: String,
    pub tasks: Vec<Task>,
}

impl WorkItemImport {
    pub fn into_work_item(self) -> Result<WorkItem> {
        let mut tasks = self.tasks;
        for task in &mut tasks {
            task.status = TaskStatus::Pending;
        }
        WorkItem::new(&self.id, &self.title, tasks)
    }
}

/// Check that a work item id is a filesystem-safe slug.
pub fn validate_id(id: &str) -> Result<()> {
    if !WORK_ITEM_ID.is_match(id) {
        bail!(
            "Invalid work item id '{}': use letters, digits, '-' or '_'",
            id
        );
    }
    Ok(())
}
