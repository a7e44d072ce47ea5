//! Run coordination: admission, phase dispatch, ledger batches and reporting.

mod events;
mod report;
mod runner;
mod status;

pub use events::RunEvent;
pub use report::{FailedTask, PhaseOutcome, PhaseReport, RunReport, RunStatus};
pub use runner::{Orchestrator, RunSettings};
pub use status::{PhaseProgress, StatusReport, TaskProgress};
