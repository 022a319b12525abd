//! Audit event types

use cadence_api::SessionStatus;
use cadence_util::{AthleteId, SessionId, TemplateId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Maintenance sweep began
    SweepStarted { trigger: String },

    /// Maintenance sweep finished (possibly with non-fatal phase failures)
    SweepFinished {
        overdue_marked: u64,
        materialized: u64,
        pruned: u64,
        warnings: Vec<String>,
    },

    /// A sweep phase failed or timed out
    SweepPhaseFailed { phase: String, error: String },

    /// Template created
    TemplateCreated {
        template_id: TemplateId,
        athlete_id: AthleteId,
    },

    /// Template deleted together with its unstarted future sessions
    TemplateDeleted {
        template_id: TemplateId,
        sessions_removed: usize,
    },

    /// Status changed by a manual action
    StatusChanged {
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        reason: Option<String>,
    },

    /// Star granted for a completed session
    StarAwarded {
        session_id: SessionId,
        athlete_id: AthleteId,
    },

    /// Missing stars repaired
    StarsBackfilled { granted: usize },

    /// An invariant was found broken
    InvariantViolation { message: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp, local wall-clock
    pub timestamp: NaiveDateTime,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: cadence_util::now().naive_local(),
            event,
        }
    }
}
