//! Store trait definitions
//!
//! Components receive these as injected handles; nothing in cadence reaches
//! for a global connection.

use cadence_api::{
    Checkin, Goal, RatingLabels, Reflection, ScheduleTemplate, Session, SessionNote, SessionSlot,
    SessionStatus,
};
use cadence_util::{AthleteId, SessionId, TemplateId};
use chrono::{NaiveDate, NaiveDateTime};

use crate::{AuditEvent, StoreResult};

/// Persisted weekly templates
pub trait ScheduleRepository: Send + Sync {
    /// Insert a new template
    fn create_template(&self, template: &ScheduleTemplate) -> StoreResult<()>;

    /// Fetch one template
    fn get_template(&self, id: &TemplateId) -> StoreResult<Option<ScheduleTemplate>>;

    /// Templates of one athlete, ordered by day then start time
    fn list_templates(&self, athlete_id: &AthleteId) -> StoreResult<Vec<ScheduleTemplate>>;

    /// Every template in the store
    fn list_all_templates(&self) -> StoreResult<Vec<ScheduleTemplate>>;

    /// Delete a template and its still-`scheduled`, not-checked-in sessions
    /// dated on or after `from`. Both happen in one transaction.
    fn delete_template(&self, id: &TemplateId, from: NaiveDate) -> StoreResult<TemplateRemoval>;
}

/// Outcome of deleting a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemplateRemoval {
    pub template_deleted: bool,
    pub sessions_removed: usize,
}

/// Persisted sessions and their child records
pub trait SessionRepository: Send + Sync {
    // Sessions

    /// Conditional insert on the `(athlete, date, start, end)` slot.
    ///
    /// Colliding candidates are skipped, not errors. The batch is one
    /// transaction: any other failure inserts nothing. Returns the number of
    /// rows actually inserted.
    fn insert_sessions_if_absent(&self, sessions: &[Session]) -> StoreResult<usize>;

    /// Fetch one session
    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>>;

    /// Sessions of one athlete dated in `[from, to]`, ordered by date and start
    fn list_sessions(
        &self,
        athlete_id: &AthleteId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Session>>;

    /// Compare-and-swap on status: writes only if the row still has `from`.
    ///
    /// Returns `false` when the row moved on (or does not exist).
    fn transition_status(
        &self,
        id: &SessionId,
        from: SessionStatus,
        to: SessionStatus,
        absence_reason: Option<&str>,
    ) -> StoreResult<bool>;

    /// Bulk-mark every non-terminal session whose resolved end is before
    /// `now` as absent. Returns the ids that were changed.
    fn mark_ended_sessions_absent(
        &self,
        now: NaiveDateTime,
        reason: &str,
    ) -> StoreResult<Vec<SessionId>>;

    /// Delete terminal sessions dated before `cutoff`, with their child
    /// records. Star awards are kept.
    fn delete_resolved_before(&self, cutoff: NaiveDate) -> StoreResult<usize>;

    /// Slots held by more than one session
    fn find_duplicate_slots(&self) -> StoreResult<Vec<SessionSlot>>;

    /// Distinct dates with a completed session on or before `up_to`, newest first
    fn completed_dates(&self, athlete_id: &AthleteId, up_to: NaiveDate)
    -> StoreResult<Vec<NaiveDate>>;

    // Check-ins

    fn get_checkin(&self, session_id: &SessionId) -> StoreResult<Option<Checkin>>;

    /// Create or replace the check-in of a session
    fn upsert_checkin(&self, checkin: &Checkin) -> StoreResult<()>;

    /// Check-ins of an athlete's sessions dated in `[from, to]`
    fn list_checkins(
        &self,
        athlete_id: &AthleteId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Checkin>>;

    // Goals

    fn add_goal(&self, session_id: &SessionId, text: &str) -> StoreResult<Goal>;

    /// Returns `false` if the goal does not exist
    fn update_goal_text(&self, goal_id: i64, text: &str) -> StoreResult<bool>;

    /// Returns `false` if the goal does not exist
    fn delete_goal(&self, goal_id: i64) -> StoreResult<bool>;

    /// Returns `false` if the goal does not exist
    fn set_goal_achieved(&self, goal_id: i64, achieved: Option<bool>) -> StoreResult<bool>;

    fn list_goals(&self, session_id: &SessionId) -> StoreResult<Vec<Goal>>;

    /// Goals attached to completed sessions dated in `[from, to]`
    fn list_goals_of_completed(
        &self,
        athlete_id: &AthleteId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Goal>>;

    // Notes

    fn add_note(&self, session_id: &SessionId, body: &str, at: NaiveDateTime)
    -> StoreResult<SessionNote>;

    fn list_notes(&self, session_id: &SessionId) -> StoreResult<Vec<SessionNote>>;

    // Completion

    /// Complete a session in one transaction: CAS `from -> completed`,
    /// write the reflection if none exists, record goal outcomes and grant
    /// the star if none exists.
    fn complete_session(&self, completion: &Completion) -> StoreResult<CompletionOutcome>;

    fn get_reflection(&self, session_id: &SessionId) -> StoreResult<Option<Reflection>>;

    // Stars

    /// Insert the star for a session unless one exists. Returns whether a
    /// row was written.
    fn award_star(
        &self,
        session_id: &SessionId,
        athlete_id: &AthleteId,
        at: NaiveDateTime,
    ) -> StoreResult<bool>;

    fn star_count_for_session(&self, session_id: &SessionId) -> StoreResult<usize>;

    fn total_stars(&self, athlete_id: &AthleteId) -> StoreResult<usize>;

    fn completed_sessions_without_star(&self) -> StoreResult<Vec<Session>>;

    // Rating labels

    fn get_rating_labels(&self, athlete_id: &AthleteId) -> StoreResult<Option<RatingLabels>>;

    /// Rejects label sets that fail validation
    fn set_rating_labels(&self, athlete_id: &AthleteId, labels: &RatingLabels)
    -> StoreResult<()>;
}

/// Input of [`SessionRepository::complete_session`]
#[derive(Debug, Clone)]
pub struct Completion {
    pub session_id: SessionId,
    pub athlete_id: AthleteId,
    pub from: SessionStatus,
    pub reflection: Reflection,
    pub goal_outcomes: Vec<(i64, bool)>,
    pub at: NaiveDateTime,
}

/// What [`SessionRepository::complete_session`] actually wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionOutcome {
    pub transitioned: bool,
    pub reflection_written: bool,
    pub star_awarded: bool,
}

/// Main store trait
pub trait Store: ScheduleRepository + SessionRepository {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
