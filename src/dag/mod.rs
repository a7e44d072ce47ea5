//! Task dependency graph and execution planning.
//!
//! ## Architecture
//!
//! 1. **Builder** - validates a work item's tasks and constructs the dependency graph
//! 2. **Planner** - layers the graph into ordered phases and picks each phase's mode
//!
//! ## Example
//!
//! ```
//! use weft::dag::{ConcurrencyRequest, DagBuilder, PhaseMode, plan};
//! use weft::work_item::Task;
//!
//! let tasks = vec![
//!     Task::new(1, "Define export schema", "code"),
//!     Task::new(2, "Write export fixtures", "code"),
//!     Task::new(3, "Serve export endpoint", "code").with_dependencies([1, 2]),
//! ];
//!
//! let graph = DagBuilder::new(&tasks).build().expect("valid graph");
//! let plan = plan(&graph, &ConcurrencyRequest::Always).expect("acyclic");
//! // Phase 1: [1, 2] concurrent
//! // Phase 2: [3]
//! assert_eq!(plan.phases[0].tasks, vec![1, 2]);
//! assert_eq!(plan.phases[0].mode, PhaseMode::Concurrent);
//! assert_eq!(plan.phases[1].tasks, vec![3]);
//! ```

mod builder;
mod planner;

pub use builder::{DagBuilder, TaskGraph};
pub use planner::{ConcurrencyRequest, ExecutionPlan, Phase, PhaseMode, plan};
