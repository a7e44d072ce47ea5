//! Capability providers: the executors that perform a task's actual work.
//!
//! The orchestrator looks providers up by capability id in a
//! [`CapabilityRegistry`] and invokes them through the [`CapabilityProvider`]
//! trait. Providers never see the ledger or the work item; they receive a
//! [`TaskRequest`] and return a [`TaskOutcome`].

mod command;

pub use command::CommandProvider;

use crate::context::Bundle;
use crate::ledger::{Decision, EntryStatus, LedgerEntry, ResolvedIssue};
use crate::work_item::{Task, TaskNumber};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a provider is asked to do.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRequest {
    pub work_item: String,
    pub task_number: TaskNumber,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    /// Read-only bundles shared with the rest of the phase.
    pub context: Vec<Arc<Bundle>>,
}

impl TaskRequest {
    pub fn new(work_item: &str, task: &Task, context: Vec<Arc<Bundle>>) -> Self {
        Self {
            work_item: work_item.to_string(),
            task_number: task.number,
            title: task.title.clone(),
            description: task.description.clone(),
            acceptance_criteria: task.acceptance_criteria.clone(),
            context,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// What a provider reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub status: OutcomeStatus,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub files_deleted: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub issues_resolved: Vec<ResolvedIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl TaskOutcome {
    pub fn success() -> Self {
        Self {
            status: OutcomeStatus::Success,
            files_created: Vec::new(),
            files_modified: Vec::new(),
            files_deleted: Vec::new(),
            decisions: Vec::new(),
            issues_resolved: Vec::new(),
            error_detail: None,
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            error_detail: Some(detail.into()),
            ..Self::success()
        }
    }

    pub fn with_created(mut self, files: &[&str]) -> Self {
        self.files_created = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_modified(mut self, files: &[&str]) -> Self {
        self.files_modified = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_decision(mut self, choice: &str, rationale: &str) -> Self {
        self.decisions.push(Decision {
            choice: choice.to_string(),
            rationale: rationale.to_string(),
        });
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// The ledger record for this outcome.
    pub fn to_entry(&self, work_item: &str, task: TaskNumber) -> LedgerEntry {
        LedgerEntry {
            work_item: work_item.to_string(),
            task,
            timestamp: Utc::now(),
            files_created: self.files_created.clone(),
            files_modified: self.files_modified.clone(),
            files_deleted: self.files_deleted.clone(),
            decisions: self.decisions.clone(),
            issues_resolved: self.issues_resolved.clone(),
            status: if self.is_success() {
                EntryStatus::Completed
            } else {
                EntryStatus::Failed
            },
            error: if self.is_success() {
                None
            } else {
                Some(
                    self.error_detail
                        .clone()
                        .unwrap_or_else(|| "provider reported failure".to_string()),
                )
            },
        }
    }
}

/// An executor for one kind of task.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Perform the task. An `Err` is recorded as a failure of this task only.
    async fn execute(&self, request: TaskRequest) -> Result<TaskOutcome>;
}

/// Capability id -> provider.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    providers: BTreeMap<String, Arc<dyn CapabilityProvider>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: &str, provider: Arc<dyn CapabilityProvider>) {
        self.providers.insert(id.to_string(), provider);
    }

    pub fn with(mut self, id: &str, provider: Arc<dyn CapabilityProvider>) -> Self {
        self.register(id, provider);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn CapabilityProvider>> {
        self.providers.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// What a scripted provider does for one invocation.
    #[derive(Debug, Clone)]
    pub enum Script {
        Succeed,
        Fail(&'static str),
        /// Fail after touching files, which leaves the task `partial`.
        FailWithChanges(&'static str),
        Error(&'static str),
        Panic,
        /// Succeed after a delay, to force overlap in concurrent phases.
        SucceedAfter(Duration),
    }

    /// Provider with per-task scripted results. Unscripted tasks succeed.
    #[derive(Default)]
    pub struct ScriptedProvider {
        scripts: Mutex<BTreeMap<TaskNumber, VecDeque<Script>>>,
        calls: Mutex<Vec<TaskNumber>>,
        contexts: Mutex<BTreeMap<TaskNumber, Vec<String>>>,
    }

    impl ScriptedProvider {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue results for a task, consumed one per invocation.
        pub fn script(self, task: TaskNumber, results: Vec<Script>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(task, results.into_iter().collect());
            self
        }

        pub fn calls(&self) -> Vec<TaskNumber> {
            self.calls.lock().unwrap().clone()
        }

        pub fn context_seen(&self, task: TaskNumber) -> Vec<String> {
            self.contexts
                .lock()
                .unwrap()
                .get(&task)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl CapabilityProvider for ScriptedProvider {
        async fn execute(&self, request: TaskRequest) -> Result<TaskOutcome> {
            let task = request.task_number;
            self.calls.lock().unwrap().push(task);
            self.contexts.lock().unwrap().insert(
                task,
                request.context.iter().map(|b| b.name.clone()).collect(),
            );
            let script = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&task)
                .and_then(|q| q.pop_front())
                .unwrap_or(Script::Succeed);

            match script {
                Script::Succeed => {
                    let path = format!("src/task_{task}.rs");
                    Ok(TaskOutcome::success().with_created(&[path.as_str()]))
                }
                Script::Fail(detail) => Ok(TaskOutcome::failure(detail)),
                Script::FailWithChanges(detail) => {
                    Ok(TaskOutcome::failure(detail).with_modified(&["src/lib.rs"]))
                }
                Script::Error(detail) => Err(anyhow::anyhow!(detail)),
                Script::Panic => panic!("provider crashed on task {task}"),
                Script::SucceedAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(TaskOutcome::success())
                }
            }
        }
    }
}
