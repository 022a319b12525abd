//! Manual session actions
//!
//! Every action re-evaluates the lifecycle state first and refuses what the
//! state does not permit. Status writes are compare-and-swap on the status
//! that was read, so a concurrent sweep or second client surfaces as
//! [`CoreError::StatusConflict`] instead of being overwritten.

use cadence_api::{
    ActionTarget, Checkin, Goal, LifecycleState, Rating, Reflection, Session, SessionNote,
    SessionStatus, SessionView,
};
use cadence_store::{AuditEvent, AuditEventType, Completion, CompletionOutcome, Store};
use cadence_util::{AthleteId, SessionId};
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::{CoreError, CoreResult, SessionLifecycle};

/// Input of [`SessionActions::complete`]
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub notes: String,
    pub session_rating: Option<Rating>,
    /// `(goal id, achieved)` pairs; goals of other sessions are ignored
    pub goal_outcomes: Vec<(i64, bool)>,
}

/// Synchronous, athlete-initiated session operations
pub struct SessionActions {
    store: Arc<dyn Store>,
    lifecycle: SessionLifecycle,
}

impl SessionActions {
    pub fn new(store: Arc<dyn Store>, lifecycle: SessionLifecycle) -> Self {
        Self { store, lifecycle }
    }

    fn load(&self, session_id: &SessionId) -> CoreResult<(Session, Option<Checkin>)> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or(CoreError::SessionNotFound(*session_id))?;
        let checkin = self.store.get_checkin(session_id)?;
        Ok((session, checkin))
    }

    fn require(
        &self,
        session_id: &SessionId,
        now: NaiveDateTime,
        action: ActionTarget,
        allowed: &[LifecycleState],
    ) -> CoreResult<(Session, LifecycleState)> {
        let (session, checkin) = self.load(session_id)?;
        let state = self.lifecycle.state(&session, checkin.as_ref(), now);
        if !allowed.contains(&state) {
            debug!(session_id = %session_id, state = %state, action = %action, "Action refused");
            return Err(CoreError::ActionNotAllowed { state, action });
        }
        Ok((session, state))
    }

    fn record_transition(
        &self,
        session: &Session,
        to: SessionStatus,
        reason: Option<&str>,
    ) {
        info!(
            session_id = %session.id,
            from = %session.status,
            to = %to,
            "Session status changed"
        );
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::StatusChanged {
            session_id: session.id,
            from: session.status,
            to,
            reason: reason.map(str::to_string),
        }));
    }

    fn swap_status(
        &self,
        session: &Session,
        to: SessionStatus,
        reason: Option<&str>,
    ) -> CoreResult<()> {
        if !self
            .store
            .transition_status(&session.id, session.status, to, reason)?
        {
            return Err(CoreError::StatusConflict {
                session_id: session.id,
                expected: session.status,
            });
        }
        self.record_transition(session, to, reason);
        Ok(())
    }

    /// Current state and action of one session
    pub fn view(&self, session_id: &SessionId, now: NaiveDateTime) -> CoreResult<SessionView> {
        let (session, checkin) = self.load(session_id)?;
        Ok(self.lifecycle.view(&session, checkin.as_ref(), now))
    }

    /// Views of an athlete's sessions dated in `[from, to]`
    pub fn views(
        &self,
        athlete_id: &AthleteId,
        from: NaiveDate,
        to: NaiveDate,
        now: NaiveDateTime,
    ) -> CoreResult<Vec<SessionView>> {
        let sessions = self.store.list_sessions(athlete_id, from, to)?;
        let mut views = Vec::with_capacity(sessions.len());
        for session in sessions {
            let checkin = self.store.get_checkin(&session.id)?;
            views.push(self.lifecycle.view(&session, checkin.as_ref(), now));
        }
        Ok(views)
    }

    /// Create or update the check-in. Refused once the session has ended.
    pub fn submit_checkin(
        &self,
        session_id: &SessionId,
        energy_level: Rating,
        mindset_level: Rating,
        reward_criteria: Option<String>,
        now: NaiveDateTime,
    ) -> CoreResult<Checkin> {
        self.require(session_id, now, ActionTarget::CheckIn, &CHECKIN_EDITABLE)?;

        let checkin = Checkin {
            session_id: *session_id,
            energy_level,
            mindset_level,
            reward_criteria: reward_criteria.filter(|r| !r.trim().is_empty()),
            submitted_at: now,
        };
        self.store.upsert_checkin(&checkin)?;
        info!(session_id = %session_id, "Check-in submitted");
        Ok(checkin)
    }

    pub fn add_goal(&self, session_id: &SessionId, text: &str, now: NaiveDateTime) -> CoreResult<Goal> {
        let text = validate_goal_text(text)?;
        self.require(session_id, now, ActionTarget::EditCheckin, &CHECKIN_EDITABLE)?;
        Ok(self.store.add_goal(session_id, text)?)
    }

    /// Replace the goal set with `texts`, in order: existing goals are renamed,
    /// extra texts become new goals and goals beyond `texts` are removed.
    /// Returns the resulting goals.
    pub fn set_goals(
        &self,
        session_id: &SessionId,
        texts: &[String],
        now: NaiveDateTime,
    ) -> CoreResult<Vec<Goal>> {
        let texts = texts
            .iter()
            .map(|t| validate_goal_text(t))
            .collect::<CoreResult<Vec<_>>>()?;
        self.require(session_id, now, ActionTarget::EditCheckin, &CHECKIN_EDITABLE)?;

        let existing = self.store.list_goals(session_id)?;
        for (idx, text) in texts.iter().enumerate() {
            match existing.get(idx) {
                Some(goal) if goal.text != *text => {
                    self.store.update_goal_text(goal.id, text)?;
                }
                Some(_) => {}
                None => {
                    self.store.add_goal(session_id, text)?;
                }
            }
        }
        for goal in existing.iter().skip(texts.len()) {
            self.store.delete_goal(goal.id)?;
        }
        Ok(self.store.list_goals(session_id)?)
    }

    pub fn add_note(
        &self,
        session_id: &SessionId,
        body: &str,
        now: NaiveDateTime,
    ) -> CoreResult<SessionNote> {
        if body.trim().is_empty() {
            return Err(CoreError::Validation("note body is empty".into()));
        }
        self.load(session_id)?;
        Ok(self.store.add_note(session_id, body, now)?)
    }

    /// `scheduled -> in_progress`, only while training is available
    pub fn start_training(&self, session_id: &SessionId, now: NaiveDateTime) -> CoreResult<Session> {
        let (session, _) = self.require(
            session_id,
            now,
            ActionTarget::StartTraining,
            &[LifecycleState::TrainingAvailable],
        )?;
        self.swap_status(&session, SessionStatus::InProgress, None)?;
        Ok(Session {
            status: SessionStatus::InProgress,
            ..session
        })
    }

    /// Any non-terminal status `-> absent`
    pub fn mark_absent(
        &self,
        session_id: &SessionId,
        reason: &str,
        now: NaiveDateTime,
    ) -> CoreResult<Session> {
        let (session, _) = self.require(session_id, now, ActionTarget::Resolve, &NON_TERMINAL)?;
        self.swap_status(&session, SessionStatus::Absent, Some(reason))?;
        Ok(Session {
            status: SessionStatus::Absent,
            absence_reason: Some(reason.to_string()),
            ..session
        })
    }

    /// Any non-terminal status `-> cancelled`
    pub fn cancel(
        &self,
        session_id: &SessionId,
        reason: Option<&str>,
        now: NaiveDateTime,
    ) -> CoreResult<Session> {
        let (session, _) = self.require(session_id, now, ActionTarget::Resolve, &NON_TERMINAL)?;
        self.swap_status(&session, SessionStatus::Cancelled, reason)?;
        Ok(Session {
            status: SessionStatus::Cancelled,
            absence_reason: reason.map(str::to_string).or(session.absence_reason.clone()),
            ..session
        })
    }

    /// Complete a session: reflection written once, goal outcomes recorded,
    /// status swapped to `completed` and exactly one star granted.
    ///
    /// Retrying on an already completed session only repairs a missing star.
    pub fn complete(
        &self,
        session_id: &SessionId,
        request: CompletionRequest,
        now: NaiveDateTime,
    ) -> CoreResult<CompletionOutcome> {
        let (session, checkin) = self.load(session_id)?;

        let outcome = if session.status == SessionStatus::Completed {
            let star_awarded = self.store.award_star(&session.id, &session.athlete_id, now)?;
            CompletionOutcome {
                transitioned: false,
                reflection_written: false,
                star_awarded,
            }
        } else {
            let state = self.lifecycle.state(&session, checkin.as_ref(), now);
            if !COMPLETABLE.contains(&state) {
                return Err(CoreError::ActionNotAllowed {
                    state,
                    action: ActionTarget::Reflect,
                });
            }

            let completion = Completion {
                session_id: session.id,
                athlete_id: session.athlete_id.clone(),
                from: session.status,
                reflection: Reflection {
                    session_id: session.id,
                    notes: request.notes,
                    session_rating: request.session_rating,
                    created_at: now,
                },
                goal_outcomes: request.goal_outcomes,
                at: now,
            };
            let outcome = self.store.complete_session(&completion)?;
            if !outcome.transitioned {
                return Err(CoreError::StatusConflict {
                    session_id: session.id,
                    expected: session.status,
                });
            }
            self.record_transition(&session, SessionStatus::Completed, None);
            outcome
        };

        if outcome.star_awarded {
            let _ = self.store.append_audit(AuditEvent::new(AuditEventType::StarAwarded {
                session_id: session.id,
                athlete_id: session.athlete_id.clone(),
            }));
        }

        let stars = self.store.star_count_for_session(&session.id)?;
        if stars != 1 {
            let message = format!("session {} has {} stars after completion", session.id, stars);
            error!(alert = true, session_id = %session.id, stars, "Star invariant violated");
            let _ = self.store.append_audit(AuditEvent::new(AuditEventType::InvariantViolation {
                message: message.clone(),
            }));
            return Err(CoreError::InvariantViolation(message));
        }

        Ok(outcome)
    }

    /// Grant the missing star of every completed session. Returns how many
    /// were granted; a second run grants none.
    pub fn backfill_star_awards(&self, now: NaiveDateTime) -> CoreResult<usize> {
        let missing = self.store.completed_sessions_without_star()?;
        let mut granted = 0;
        for session in &missing {
            if self.store.award_star(&session.id, &session.athlete_id, now)? {
                granted += 1;
            }
        }

        info!(candidates = missing.len(), granted, "Star backfill finished");
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::StarsBackfilled { granted }));
        Ok(granted)
    }
}

const CHECKIN_EDITABLE: [LifecycleState; 4] = [
    LifecycleState::CheckinAvailable,
    LifecycleState::CheckinCompleted,
    LifecycleState::TrainingAvailable,
    LifecycleState::TrainingActive,
];

const NON_TERMINAL: [LifecycleState; 7] = [
    LifecycleState::AwaitingCheckin,
    LifecycleState::CheckinAvailable,
    LifecycleState::CheckinCompleted,
    LifecycleState::TrainingAvailable,
    LifecycleState::TrainingActive,
    LifecycleState::ReflectionAvailable,
    LifecycleState::Overdue,
];

const COMPLETABLE: [LifecycleState; 4] = [
    LifecycleState::TrainingAvailable,
    LifecycleState::TrainingActive,
    LifecycleState::ReflectionAvailable,
    LifecycleState::Overdue,
];

fn validate_goal_text(text: &str) -> CoreResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("goal text is empty".into()));
    }
    Ok(trimmed)
}
