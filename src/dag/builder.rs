//! Task graph construction and structural validation.
//!
//! The builder checks that task numbers are unique, titles are present and every
//! dependency names a task in the same work item. Cycles are left to the planner,
//! which reports them as [`WeftError::CyclicDependency`](crate::errors::WeftError).

use crate::work_item::{Task, TaskNumber};
use std::collections::{BTreeMap, BTreeSet};

/// Dependency graph over a work item's tasks, keyed by task number.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// Task number -> the tasks it depends on.
    dependencies: BTreeMap<TaskNumber, BTreeSet<TaskNumber>>,
    /// Task number -> the tasks that depend on it.
    dependents: BTreeMap<TaskNumber, BTreeSet<TaskNumber>>,
}

impl TaskGraph {
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// All task numbers, ascending.
    pub fn tasks(&self) -> impl Iterator<Item = TaskNumber> + '_ {
        self.dependencies.keys().copied()
    }

    pub fn contains(&self, task: TaskNumber) -> bool {
        self.dependencies.contains_key(&task)
    }

    /// Tasks that `task` depends on.
    pub fn dependencies(&self, task: TaskNumber) -> impl Iterator<Item = TaskNumber> + '_ {
        self.dependencies
            .get(&task)
            .into_iter()
            .flat_map(|deps| deps.iter().copied())
    }

    /// Tasks that depend on `task`.
    pub fn dependents(&self, task: TaskNumber) -> impl Iterator<Item = TaskNumber> + '_ {
        self.dependents
            .get(&task)
            .into_iter()
            .flat_map(|deps| deps.iter().copied())
    }

    /// Whether there is a direct edge between `a` and `b` in either direction.
    pub fn has_edge(&self, a: TaskNumber, b: TaskNumber) -> bool {
        let depends = |from: TaskNumber, to: TaskNumber| {
            self.dependencies
                .get(&from)
                .is_some_and(|deps| deps.contains(&to))
        };
        depends(a, b) || depends(b, a)
    }

    /// Check if every dependency of `task` is in `placed`.
    pub fn dependencies_satisfied(&self, task: TaskNumber, placed: &BTreeSet<TaskNumber>) -> bool {
        self.dependencies(task).all(|dep| placed.contains(&dep))
    }
}

/// Builds a [`TaskGraph`] from a task list.
pub struct DagBuilder<'a> {
    tasks: &'a [Task],
}

impl<'a> DagBuilder<'a> {
    pub fn new(tasks: &'a [Task]) -> Self {
        Self { tasks }
    }

    /// Build the graph, or return every structural problem found.
    pub fn build(self) -> Result<TaskGraph, Vec<String>> {
        let mut problems = Vec::new();
        let mut dependencies: BTreeMap<TaskNumber, BTreeSet<TaskNumber>> = BTreeMap::new();

        for task in self.tasks {
            if dependencies.contains_key(&task.number) {
                problems.push(format!("Duplicate task number: {}", task.number));
                continue;
            }
            if task.title.trim().is_empty() {
                problems.push(format!("Task {} has an empty title", task.number));
            }
            dependencies.insert(task.number, task.dependencies.clone());
        }

        let mut dependents: BTreeMap<TaskNumber, BTreeSet<TaskNumber>> = dependencies
            .keys()
            .map(|n| (*n, BTreeSet::new()))
            .collect();

        for (task, deps) in &dependencies {
            for dep in deps {
                if dep == task {
                    problems.push(format!("Task {} depends on itself", task));
                    continue;
                }
                match dependents.get_mut(dep) {
                    Some(set) => {
                        set.insert(*task);
                    }
                    None => problems.push(format!(
                        "Unknown dependency {} in task {}: no task with that number exists",
                        dep, task
                    )),
                }
            }
        }

        if problems.is_empty() {
            Ok(TaskGraph {
                dependencies,
                dependents,
            })
        } else {
            Err(problems)
        }
    }
}
