//! Lifecycle state machine for work items.
//!
//! ```text
//! automatic: planned -> in_progress -> completed -> summarized
//! manual:    planned -> archived
//!            in_progress -> planned
//!            completed -> in_progress
//!            summarized -> completed
//!            archived -> completed
//! ```
//!
//! Automatic edges are taken only by the orchestrator (or the summarization pass);
//! manual edges are operator overrides. Every accepted transition appends one
//! [`HistoryRecord`]. A rejected request leaves the work item untouched.

use crate::errors::WeftError;
use crate::work_item::WorkItem;
use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Planned,
    InProgress,
    Completed,
    Summarized,
    Archived,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 5] = [
        LifecycleState::Planned,
        LifecycleState::InProgress,
        LifecycleState::Completed,
        LifecycleState::Summarized,
        LifecycleState::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Planned => "planned",
            LifecycleState::InProgress => "in_progress",
            LifecycleState::Completed => "completed",
            LifecycleState::Summarized => "summarized",
            LifecycleState::Archived => "archived",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "planned" => Ok(LifecycleState::Planned),
            "in_progress" => Ok(LifecycleState::InProgress),
            "completed" => Ok(LifecycleState::Completed),
            "summarized" => Ok(LifecycleState::Summarized),
            "archived" => Ok(LifecycleState::Archived),
            _ => bail!(
                "Invalid lifecycle state: '{}'. Valid options: planned, in_progress, completed, summarized, archived",
                s
            ),
        }
    }
}

/// What caused a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The initial record written when the work item is created.
    Created,
    Automatic,
    Manual,
}

/// One accepted lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub state: LifecycleState,
    pub timestamp: DateTime<Utc>,
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Whether `from -> to` is an edge for the given trigger kind.
pub fn is_legal(from: LifecycleState, to: LifecycleState, trigger: Trigger) -> bool {
    use LifecycleState::*;
    match trigger {
        Trigger::Automatic => matches!(
            (from, to),
            (Planned, InProgress) | (InProgress, Completed) | (Completed, Summarized)
        ),
        Trigger::Manual => matches!(
            (from, to),
            (Planned, Archived)
                | (InProgress, Planned)
                | (Completed, InProgress)
                | (Summarized, Completed)
                | (Archived, Completed)
        ),
        Trigger::Created => false,
    }
}

/// Legal successors of `from` for a trigger kind, in state order.
pub fn legal_next_states(from: LifecycleState, trigger: Trigger) -> Vec<LifecycleState> {
    LifecycleState::ALL
        .into_iter()
        .filter(|to| is_legal(from, *to, trigger))
        .collect()
}

/// Apply a transition to `item`, appending a history record.
///
/// On an illegal request returns `WeftError::StateTransition` and leaves `item`
/// unchanged.
pub fn transition(
    item: &mut WorkItem,
    target: LifecycleState,
    trigger: Trigger,
    note: Option<String>,
) -> Result<(), WeftError> {
    let from = item.lifecycle;
    if !is_legal(from, target, trigger) {
        return Err(WeftError::StateTransition {
            from,
            requested: target,
            allowed: legal_next_states(from, trigger),
        });
    }

    let now = Utc::now();
    item.lifecycle = target;
    match target {
        LifecycleState::Completed => {
            if from == LifecycleState::InProgress {
                item.completed_at = Some(now);
            }
            if from == LifecycleState::Summarized {
                item.is_summarized = false;
            }
        }
        LifecycleState::Summarized => item.is_summarized = true,
        LifecycleState::InProgress | LifecycleState::Planned => {
            item.completed_at = None;
            item.is_summarized = false;
        }
        LifecycleState::Archived => {}
    }
    item.history.push(HistoryRecord {
        state: target,
        timestamp: now,
        trigger,
        note,
    });

    tracing::info!(
        work_item = %item.id,
        from = %from,
        to = %target,
        trigger = ?trigger,
        "Lifecycle transition"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work_item::Task;

    fn item() -> WorkItem {
        WorkItem::new("W1", "Feature", vec![Task::new(1, "a", "code")]).unwrap()
    }

    fn item_at(state: LifecycleState) -> WorkItem {
        let mut item = item();
        item.lifecycle = state;
        item
    }

    #[test]
    fn test_planned_to_completed_rejected_without_mutation() {
        let mut item = item();
        let before = item.history.clone();

        let err = transition(&mut item, LifecycleState::Completed, Trigger::Automatic, None)
            .unwrap_err();

        match err {
            WeftError::StateTransition {
                from,
                requested,
                allowed,
            } => {
                assert_eq!(from, LifecycleState::Planned);
                assert_eq!(requested, LifecycleState::Completed);
                assert_eq!(allowed, vec![LifecycleState::InProgress]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(item.lifecycle, LifecycleState::Planned);
        assert_eq!(item.history, before);
    }

    #[test]
    fn test_automatic_path_appends_two_records() {
        let mut item = item();
        transition(&mut item, LifecycleState::InProgress, Trigger::Automatic, None).unwrap();
        transition(&mut item, LifecycleState::Completed, Trigger::Automatic, None).unwrap();

        assert_eq!(item.history.len(), 3);
        assert_eq!(item.history[0].trigger, Trigger::Created);
        let automatic: Vec<_> = item.history[1..]
            .iter()
            .map(|r| (r.state, r.trigger))
            .collect();
        assert_eq!(
            automatic,
            vec![
                (LifecycleState::InProgress, Trigger::Automatic),
                (LifecycleState::Completed, Trigger::Automatic),
            ]
        );
        assert!(item.completed_at.is_some());
    }

    #[test]
    fn test_manual_override_edges() {
        let cases = [
            (LifecycleState::Planned, LifecycleState::Archived),
            (LifecycleState::InProgress, LifecycleState::Planned),
            (LifecycleState::Completed, LifecycleState::InProgress),
            (LifecycleState::Summarized, LifecycleState::Completed),
            (LifecycleState::Archived, LifecycleState::Completed),
        ];
        for (from, to) in cases {
            let mut item = item_at(from);
            transition(&mut item, to, Trigger::Manual, Some("operator".into())).unwrap();
            assert_eq!(item.lifecycle, to);
            assert_eq!(item.history.last().unwrap().note.as_deref(), Some("operator"));
        }
    }

    #[test]
    fn test_automatic_edge_not_available_manually() {
        let mut item = item();
        let err = transition(&mut item, LifecycleState::InProgress, Trigger::Manual, None)
            .unwrap_err();
        assert!(matches!(
            err,
            WeftError::StateTransition { ref allowed, .. } if allowed == &vec![LifecycleState::Archived]
        ));
        assert_eq!(item.history.len(), 1);
    }

    #[test]
    fn test_every_other_pair_is_illegal() {
        let mut legal = 0;
        for from in LifecycleState::ALL {
            for to in LifecycleState::ALL {
                for trigger in [Trigger::Automatic, Trigger::Manual, Trigger::Created] {
                    if is_legal(from, to, trigger) {
                        legal += 1;
                    }
                }
            }
        }
        assert_eq!(legal, 8);
    }

    #[test]
    fn test_summarize_and_reopen_flags() {
        let mut item = item_at(LifecycleState::Completed);
        transition(&mut item, LifecycleState::Summarized, Trigger::Automatic, None).unwrap();
        assert!(item.is_summarized);

        transition(&mut item, LifecycleState::Completed, Trigger::Manual, None).unwrap();
        assert!(!item.is_summarized);

        item.completed_at = Some(Utc::now());
        transition(&mut item, LifecycleState::InProgress, Trigger::Manual, None).unwrap();
        assert!(item.completed_at.is_none());
    }

    #[test]
    fn test_state_from_str() {
        assert_eq!(
            "in-progress".parse::<LifecycleState>().unwrap(),
            LifecycleState::InProgress
        );
        assert_eq!(
            "ARCHIVED".parse::<LifecycleState>().unwrap(),
            LifecycleState::Archived
        );
        assert!("done".parse::<LifecycleState>().is_err());
    }
}
