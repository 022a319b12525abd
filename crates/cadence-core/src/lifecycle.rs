//! Lifecycle state machine
//!
//! The single source of truth for "where is this session and what may the
//! athlete do now". Pure: no I/O, deterministic in `(session, checkin, now)`,
//! safe to re-evaluate on every clock tick.

use cadence_api::{
    ActionTarget, Checkin, LifecycleState, Session, SessionAction, SessionStatus, SessionView,
};
use cadence_config::LifecyclePolicy;
use chrono::NaiveDateTime;

/// State machine parameterised by lifecycle timing
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionLifecycle {
    policy: LifecyclePolicy,
}

impl SessionLifecycle {
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Evaluate the state of `session` at local time `now`.
    ///
    /// First match wins:
    /// 1. terminal status
    /// 2. `now >= end`: overdue, unless the session was checked in or started
    ///    and `now` is still inside the reflection grace
    /// 3. no check-in: check-in window `[start - lead, end)` or awaiting
    /// 4. checked in before start
    /// 5. inside `[start, end)`: active if in progress, else available
    pub fn state(
        &self,
        session: &Session,
        checkin: Option<&Checkin>,
        now: NaiveDateTime,
    ) -> LifecycleState {
        match session.status {
            SessionStatus::Completed => return LifecycleState::Completed,
            SessionStatus::Absent | SessionStatus::Cancelled => return LifecycleState::Absent,
            SessionStatus::Scheduled | SessionStatus::InProgress => {}
        }

        let window = session.window();
        let in_progress = session.status == SessionStatus::InProgress;

        if window.has_ended(now) {
            if checkin.is_none() && !in_progress {
                return LifecycleState::Overdue;
            }
            if now >= window.end + self.policy.reflection_grace {
                return LifecycleState::Overdue;
            }
            return LifecycleState::ReflectionAvailable;
        }

        if checkin.is_none() {
            if now >= window.checkin_opens(self.policy.checkin_lead) {
                return LifecycleState::CheckinAvailable;
            }
            return LifecycleState::AwaitingCheckin;
        }

        if now < window.start {
            return LifecycleState::CheckinCompleted;
        }

        if in_progress {
            LifecycleState::TrainingActive
        } else {
            LifecycleState::TrainingAvailable
        }
    }

    /// Evaluate and project in one step
    pub fn view(
        &self,
        session: &Session,
        checkin: Option<&Checkin>,
        now: NaiveDateTime,
    ) -> SessionView {
        let state = self.state(session, checkin, now);
        SessionView {
            session: session.clone(),
            state,
            action: action(state),
        }
    }
}

/// Evaluate with the default lifecycle timing
pub fn session_state(
    session: &Session,
    checkin: Option<&Checkin>,
    now: NaiveDateTime,
) -> LifecycleState {
    SessionLifecycle::default().state(session, checkin, now)
}

/// The primary action offered in each state
pub fn action(state: LifecycleState) -> SessionAction {
    let (label, target, enabled) = match state {
        LifecycleState::AwaitingCheckin => ("Check-in opens soon", ActionTarget::CheckIn, false),
        LifecycleState::CheckinAvailable => ("Check in", ActionTarget::CheckIn, true),
        LifecycleState::CheckinCompleted => ("Edit check-in", ActionTarget::EditCheckin, true),
        LifecycleState::TrainingAvailable => ("Start training", ActionTarget::StartTraining, true),
        LifecycleState::TrainingActive => {
            ("Training in progress", ActionTarget::ContinueTraining, true)
        }
        LifecycleState::ReflectionAvailable => ("Reflect", ActionTarget::Reflect, true),
        LifecycleState::Completed => ("View summary", ActionTarget::ViewSummary, true),
        LifecycleState::Absent => ("Missed", ActionTarget::None, false),
        LifecycleState::Overdue => ("Resolve session", ActionTarget::Resolve, true),
    };
    SessionAction {
        label: label.to_string(),
        target,
        enabled,
    }
}
