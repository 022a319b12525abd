//! Lifecycle states and the action a caller may offer in each

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a session stands right now, derived from its record, its check-in
/// and the local wall-clock time. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    AwaitingCheckin,
    CheckinAvailable,
    CheckinCompleted,
    TrainingAvailable,
    TrainingActive,
    ReflectionAvailable,
    Completed,
    Absent,
    Overdue,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 9] = [
        LifecycleState::AwaitingCheckin,
        LifecycleState::CheckinAvailable,
        LifecycleState::CheckinCompleted,
        LifecycleState::TrainingAvailable,
        LifecycleState::TrainingActive,
        LifecycleState::ReflectionAvailable,
        LifecycleState::Completed,
        LifecycleState::Absent,
        LifecycleState::Overdue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::AwaitingCheckin => "awaiting_checkin",
            LifecycleState::CheckinAvailable => "checkin_available",
            LifecycleState::CheckinCompleted => "checkin_completed",
            LifecycleState::TrainingAvailable => "training_available",
            LifecycleState::TrainingActive => "training_active",
            LifecycleState::ReflectionAvailable => "reflection_available",
            LifecycleState::Completed => "completed",
            LifecycleState::Absent => "absent",
            LifecycleState::Overdue => "overdue",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Completed | LifecycleState::Absent)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the primary button of a session leads to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTarget {
    CheckIn,
    EditCheckin,
    StartTraining,
    ContinueTraining,
    Reflect,
    Resolve,
    ViewSummary,
    None,
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionTarget::CheckIn => "check_in",
            ActionTarget::EditCheckin => "edit_checkin",
            ActionTarget::StartTraining => "start_training",
            ActionTarget::ContinueTraining => "continue_training",
            ActionTarget::Reflect => "reflect",
            ActionTarget::Resolve => "resolve",
            ActionTarget::ViewSummary => "view_summary",
            ActionTarget::None => "none",
        };
        f.write_str(s)
    }
}

/// Rendered projection of a lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAction {
    pub label: String,
    pub target: ActionTarget,
    pub enabled: bool,
}

/// A session together with its evaluated state and action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub session: crate::Session,
    pub state: LifecycleState,
    pub action: SessionAction,
}
