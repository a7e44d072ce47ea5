//! The orchestrator: drives a work item's phases to completion.
//!
//! Per run:
//! 1. Load the work item and read its ledger (the resume check).
//! 2. Admit the task set: graph structure, atomicity threshold, registered
//!    capabilities. Then plan phases. Both happen before anything is written.
//! 3. For each phase, skip tasks the ledger already records as completed,
//!    populate the context cache, dispatch the rest, and write one ledger batch
//!    once every dispatched task has resolved.
//! 4. A partially completed phase halts the run; later phases are not attempted.

use crate::atomicity;
use crate::capability::{CapabilityRegistry, TaskOutcome, TaskRequest};
use crate::context::{BundleCatalog, BundleSource, ContextCache, NoBundleSource};
use crate::dag::{ConcurrencyRequest, DagBuilder, ExecutionPlan, Phase, PhaseMode, plan};
use crate::errors::{NextAction, WeftError};
use crate::ledger::{self, LedgerEntry, LedgerStore};
use crate::lifecycle::{self, LifecycleState, Trigger};
use crate::orchestrator::events::RunEvent;
use crate::orchestrator::report::{FailedTask, PhaseOutcome, PhaseReport, RunReport, RunStatus};
use crate::work_item::{Task, TaskNumber, TaskStatus, WorkItem, WorkItemRegistry};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Minimum atomicity score a pending task needs to be admitted.
    pub threshold: u8,
    pub concurrency: ConcurrencyRequest,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            threshold: atomicity::DEFAULT_THRESHOLD,
            concurrency: ConcurrencyRequest::Always,
        }
    }
}

impl RunSettings {
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyRequest) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Sole writer of work item state and the execution ledger.
pub struct Orchestrator {
    registry: Arc<dyn WorkItemRegistry>,
    ledger: Arc<dyn LedgerStore>,
    capabilities: CapabilityRegistry,
    bundles: Arc<dyn BundleSource>,
    catalog: BundleCatalog,
    settings: RunSettings,
    event_tx: Option<mpsc::Sender<RunEvent>>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<dyn WorkItemRegistry>,
        ledger: Arc<dyn LedgerStore>,
        capabilities: CapabilityRegistry,
    ) -> Self {
        Self {
            registry,
            ledger,
            capabilities,
            bundles: Arc::new(NoBundleSource),
            catalog: BundleCatalog::new(),
            settings: RunSettings::default(),
            event_tx: None,
        }
    }

    /// Set where context bundles come from and which capabilities need which.
    pub fn with_bundles(mut self, source: Arc<dyn BundleSource>, catalog: BundleCatalog) -> Self {
        self.bundles = source;
        self.catalog = catalog;
        self
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Admit the work item's pending tasks and plan its phases. No side effects.
    pub fn prepare(
        &self,
        item: &WorkItem,
        completed: &BTreeSet<TaskNumber>,
    ) -> Result<ExecutionPlan, WeftError> {
        let mut problems = Vec::new();
        if item.tasks.is_empty() {
            problems.push("Work item has no tasks".to_string());
        }

        let graph = match DagBuilder::new(&item.tasks).build() {
            Ok(graph) => Some(graph),
            Err(structural) => {
                problems.extend(structural);
                None
            }
        };

        for task in item.tasks.iter().filter(|t| !completed.contains(&t.number)) {
            let report = atomicity::score_task(task);
            if !report.passes(self.settings.threshold) {
                problems.push(format!(
                    "Task {} scores {} ({}), below threshold {}",
                    task.number, report.score, report.classification, self.settings.threshold
                ));
            }
            if !self.capabilities.contains(&task.capability) {
                problems.push(format!(
                    "Task {} needs capability '{}', which has no registered provider",
                    task.number, task.capability
                ));
            }
        }

        match graph {
            Some(graph) if problems.is_empty() => plan(&graph, &self.settings.concurrency),
            _ => Err(WeftError::validation(&item.id, problems)),
        }
    }

    /// Run (or resume) a work item.
    ///
    /// Returns `Ok` for runs that completed or halted on a partially completed
    /// phase; the report says which. Pre-dispatch problems, ledger write failures
    /// and missing context bundles are returned as errors.
    pub async fn run(&self, id: &str, resume: bool) -> Result<RunReport, WeftError> {
        let mut item = self.registry.load(id).map_err(WeftError::Persistence)?;
        let entries = self.ledger.entries(id).map_err(WeftError::Persistence)?;

        if !resume && !entries.is_empty() {
            return Err(WeftError::validation(
                id,
                vec![format!(
                    "Ledger already holds {} entries; rerun with --resume to continue",
                    entries.len()
                )],
            ));
        }

        let completed = ledger::completed_tasks(&entries);
        let plan = self.prepare(&item, &completed)?;
        let pending_total = item
            .tasks
            .iter()
            .filter(|t| !completed.contains(&t.number))
            .count();
        check_preconditions(&item, pending_total)?;

        // The ledger wins over a work item record that missed a save.
        for task in item.tasks.iter_mut() {
            if completed.contains(&task.number) {
                task.status = TaskStatus::Completed;
            }
        }

        let mut report = RunReport::new(id);
        report.previously_completed = item
            .tasks
            .iter()
            .map(|t| t.number)
            .filter(|n| completed.contains(n))
            .collect();
        report.previously_completed.sort_unstable();

        info!(
            work_item = id,
            phases = plan.len(),
            pending = pending_total,
            resume,
            "Run started"
        );
        self.emit(RunEvent::RunStarted {
            work_item: id.to_string(),
            phases: plan.len(),
            pending: pending_total,
        })
        .await;

        for (index, phase) in plan.phases.iter().enumerate() {
            let pending: Vec<TaskNumber> = phase
                .tasks
                .iter()
                .copied()
                .filter(|t| !completed.contains(t))
                .collect();

            if pending.is_empty() {
                debug!(work_item = id, phase = phase.number, "Phase already complete");
                report.phases.push(phase_report(phase, Vec::new(), PhaseOutcome::Completed));
                self.emit(RunEvent::PhaseSkipped {
                    phase: phase.number,
                })
                .await;
                continue;
            }

            info!(
                work_item = id,
                phase = phase.number,
                mode = %phase.mode,
                pending = pending.len(),
                "Phase started"
            );
            self.emit(RunEvent::PhaseStarted {
                phase: phase.number,
                mode: phase.mode,
                pending: pending.clone(),
            })
            .await;

            let pending_tasks: Vec<&Task> = pending.iter().filter_map(|n| item.task(*n)).collect();
            let cache = match ContextCache::populate(
                phase.number,
                &pending_tasks,
                &self.catalog,
                self.bundles.as_ref(),
            ) {
                Ok(cache) => cache,
                Err(WeftError::ResourceUnavailable {
                    phase: blocked,
                    bundle,
                    reason,
                    ..
                }) => {
                    error!(
                        work_item = id,
                        phase = blocked,
                        bundle = %bundle,
                        reason = %reason,
                        "Context bundle unavailable"
                    );
                    report.phases.push(phase_report(phase, Vec::new(), PhaseOutcome::NotStarted));
                    let skipped = remaining_tasks(&plan, index, &completed);
                    return Err(WeftError::ResourceUnavailable {
                        phase: blocked,
                        bundle,
                        reason,
                        report: Some(self.abort(report, &item, blocked, skipped).await),
                    });
                }
                Err(other) => return Err(other),
            };
            let requests: Vec<(String, TaskRequest)> = pending_tasks
                .iter()
                .map(|t| {
                    (
                        t.capability.clone(),
                        TaskRequest::new(id, t, cache.context_for(t.number)),
                    )
                })
                .collect();

            if item.lifecycle == LifecycleState::Planned
                && let Err(err) = self.advance(&mut item, LifecycleState::InProgress).await
            {
                let skipped = remaining_tasks(&plan, index, &completed);
                return Err(self.save_failed(err, report, &item, phase.number, skipped).await);
            }

            let results = self.dispatch(phase, requests).await;
            drop(cache);

            let mut phase_failed = Vec::new();
            for (task, outcome) in &results {
                if outcome.is_success() {
                    report.succeeded.push(*task);
                } else {
                    let detail = outcome
                        .error_detail
                        .clone()
                        .unwrap_or_else(|| "provider reported failure".to_string());
                    warn!(work_item = id, phase = phase.number, task, error = %detail, "Task failed");
                    phase_failed.push(*task);
                    report.failed.push(FailedTask {
                        task: *task,
                        error: detail,
                    });
                }
            }
            let outcome = if phase_failed.is_empty() {
                PhaseOutcome::Completed
            } else {
                PhaseOutcome::PartiallyCompleted
            };

            let batch: Vec<LedgerEntry> = results
                .iter()
                .map(|(task, outcome)| outcome.to_entry(id, *task))
                .collect();

            if let Err(source) = self.ledger.append_batch(id, &batch) {
                error!(
                    work_item = id,
                    phase = phase.number,
                    entries = batch.len(),
                    error = %format!("{:#}", source),
                    "Ledger batch write failed"
                );
                // Dispatched, but the outcome never reached the ledger.
                report.phases.push(phase_report(phase, pending, PhaseOutcome::Running));
                report.unrecorded = batch;
                let skipped = later_tasks(&plan, index, &completed);
                return Err(WeftError::LedgerWrite {
                    work_item: id.to_string(),
                    phase: phase.number,
                    source,
                    report: self.abort(report, &item, phase.number, skipped).await,
                });
            }

            for entry in &batch {
                if let Some(task) = item.task_mut(entry.task) {
                    task.status = if entry.is_completed() {
                        TaskStatus::Completed
                    } else if entry.has_file_changes() {
                        TaskStatus::Partial
                    } else {
                        TaskStatus::Blocked
                    };
                }
            }
            report.phases.push(phase_report(phase, pending, outcome));
            if let Err(source) = self.registry.save(&item) {
                let skipped = later_tasks(&plan, index, &completed);
                return Err(self
                    .save_failed(WeftError::Persistence(source), report, &item, phase.number, skipped)
                    .await);
            }

            info!(work_item = id, phase = phase.number, outcome = %outcome, "Phase finished");
            self.emit(RunEvent::PhaseFinished {
                phase: phase.number,
                outcome,
            })
            .await;

            if outcome == PhaseOutcome::PartiallyCompleted {
                report.status = RunStatus::Halted;
                report.halted_at = Some(phase.number);
                report.skipped = later_tasks(&plan, index, &completed);
                report.next_action = Some(NextAction::FixAndResume);
                report.lifecycle = item.lifecycle;
                warn!(
                    work_item = id,
                    phase = phase.number,
                    failed = ?phase_failed,
                    "Run halted on partially completed phase"
                );
                self.emit(RunEvent::RunFinished {
                    status: RunStatus::Halted,
                })
                .await;
                return Ok(report);
            }
        }

        // Also covers a lost lifecycle save: every task is in the ledger but the
        // work item never reached `completed`.
        let last_phase = plan.phases.last().map_or(0, |p| p.number);
        let mut finished = Ok(());
        if item.lifecycle == LifecycleState::Planned {
            finished = self.advance(&mut item, LifecycleState::InProgress).await;
        }
        if finished.is_ok() {
            finished = if item.lifecycle == LifecycleState::InProgress {
                self.advance(&mut item, LifecycleState::Completed).await
            } else {
                self.registry.save(&item).map_err(WeftError::Persistence)
            };
        }
        if let Err(err) = finished {
            return Err(self
                .save_failed(err, report, &item, last_phase, Vec::new())
                .await);
        }

        report.lifecycle = item.lifecycle;
        info!(
            work_item = id,
            dispatched = report.dispatched(),
            "Run completed"
        );
        self.emit(RunEvent::RunFinished {
            status: RunStatus::Completed,
        })
        .await;
        Ok(report)
    }

    /// Close out the report of a run stopped by a fatal error at `phase`.
    async fn abort(
        &self,
        mut report: RunReport,
        item: &WorkItem,
        phase: usize,
        skipped: Vec<TaskNumber>,
    ) -> Box<RunReport> {
        report.status = RunStatus::Aborted;
        report.halted_at = Some(phase);
        report.skipped = skipped;
        report.next_action = Some(NextAction::Retry);
        report.lifecycle = item.lifecycle;
        self.emit(RunEvent::RunFinished {
            status: RunStatus::Aborted,
        })
        .await;
        Box::new(report)
    }

    /// Attach the run report to a failed work item save.
    async fn save_failed(
        &self,
        err: WeftError,
        report: RunReport,
        item: &WorkItem,
        phase: usize,
        skipped: Vec<TaskNumber>,
    ) -> WeftError {
        match err {
            WeftError::Persistence(source) => {
                error!(
                    work_item = %item.id,
                    phase,
                    error = %format!("{:#}", source),
                    "Work item save failed"
                );
                WeftError::StateSave {
                    work_item: item.id.clone(),
                    phase,
                    source,
                    report: self.abort(report, item, phase, skipped).await,
                }
            }
            other => other,
        }
    }

    /// Apply an automatic transition and persist it.
    async fn advance(&self, item: &mut WorkItem, target: LifecycleState) -> Result<(), WeftError> {
        let from = item.lifecycle;
        lifecycle::transition(item, target, Trigger::Automatic, None)?;
        self.registry.save(item).map_err(WeftError::Persistence)?;
        self.emit(RunEvent::LifecycleChanged { from, to: target }).await;
        Ok(())
    }

    /// Dispatch a phase's pending tasks and wait for all of them.
    ///
    /// Sequential phases await each task before spawning the next. Concurrent
    /// phases spawn everything first and join at a single barrier. Either way a
    /// provider error or panic only fails its own task.
    async fn dispatch(
        &self,
        phase: &Phase,
        requests: Vec<(String, TaskRequest)>,
    ) -> Vec<(TaskNumber, TaskOutcome)> {
        let mut results = Vec::with_capacity(requests.len());
        match phase.mode {
            PhaseMode::Sequential => {
                for (capability, request) in requests {
                    let task = request.task_number;
                    let handle = self.spawn_task(phase.number, capability, request).await;
                    let outcome = self.resolve(phase.number, task, handle.await).await;
                    results.push((task, outcome));
                }
            }
            PhaseMode::Concurrent => {
                let mut tasks = Vec::with_capacity(requests.len());
                let mut handles = Vec::with_capacity(requests.len());
                for (capability, request) in requests {
                    tasks.push(request.task_number);
                    handles.push(self.spawn_task(phase.number, capability, request).await);
                }
                for (task, joined) in tasks.into_iter().zip(join_all(handles).await) {
                    let outcome = self.resolve(phase.number, task, joined).await;
                    results.push((task, outcome));
                }
            }
        }
        results
    }

    async fn spawn_task(
        &self,
        phase: usize,
        capability: String,
        request: TaskRequest,
    ) -> JoinHandle<TaskOutcome> {
        let task = request.task_number;
        debug!(phase, task, capability = %capability, "Dispatching task");
        self.emit(RunEvent::TaskDispatched { phase, task }).await;

        let provider = self.capabilities.get(&capability);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let outcome = match provider {
                Some(provider) => match provider.execute(request).await {
                    Ok(outcome) => outcome,
                    Err(e) => TaskOutcome::failure(format!("{:#}", e)),
                },
                None => TaskOutcome::failure(format!(
                    "No provider registered for capability '{}'",
                    capability
                )),
            };
            if let Some(tx) = event_tx {
                tx.send(RunEvent::TaskFinished {
                    phase,
                    task,
                    success: outcome.is_success(),
                    error: outcome.error_detail.clone(),
                })
                .await
                .ok();
            }
            outcome
        })
    }

    /// Turn a join result into an outcome; a panicked provider is that task's failure.
    async fn resolve(
        &self,
        phase: usize,
        task: TaskNumber,
        joined: Result<TaskOutcome, JoinError>,
    ) -> TaskOutcome {
        match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                let detail = if e.is_panic() {
                    "Capability provider panicked".to_string()
                } else {
                    format!("Capability provider task failed: {}", e)
                };
                self.emit(RunEvent::TaskFinished {
                    phase,
                    task,
                    success: false,
                    error: Some(detail.clone()),
                })
                .await;
                TaskOutcome::failure(detail)
            }
        }
    }

    async fn emit(&self, event: RunEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}

/// A run may only dispatch from `planned` or `in_progress`. A finished item with
/// nothing pending is a no-op run.
fn check_preconditions(item: &WorkItem, pending: usize) -> Result<(), WeftError> {
    match item.lifecycle {
        LifecycleState::Planned | LifecycleState::InProgress => Ok(()),
        LifecycleState::Completed | LifecycleState::Summarized if pending == 0 => Ok(()),
        state => Err(WeftError::StateTransition {
            from: state,
            requested: LifecycleState::InProgress,
            allowed: lifecycle::legal_next_states(state, Trigger::Automatic),
        }),
    }
}

fn phase_report(phase: &Phase, dispatched: Vec<TaskNumber>, outcome: PhaseOutcome) -> PhaseReport {
    PhaseReport {
        number: phase.number,
        mode: phase.mode,
        tasks: phase.tasks.clone(),
        dispatched,
        outcome,
    }
}

/// Not-yet-completed tasks in phases after `index`.
fn later_tasks(plan: &ExecutionPlan, index: usize, completed: &BTreeSet<TaskNumber>) -> Vec<TaskNumber> {
    remaining_tasks(plan, index + 1, completed)
}

/// Not-yet-completed tasks from phase `index` on.
fn remaining_tasks(
    plan: &ExecutionPlan,
    index: usize,
    completed: &BTreeSet<TaskNumber>,
) -> Vec<TaskNumber> {
    plan.phases[index.min(plan.phases.len())..]
        .iter()
        .flat_map(|p| p.tasks.iter().copied())
        .filter(|t| !completed.contains(t))
        .collect()
}
