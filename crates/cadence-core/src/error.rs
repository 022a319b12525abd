//! Domain error taxonomy

use cadence_api::{ActionTarget, LifecycleState, SessionStatus};
use cadence_store::StoreError;
use cadence_util::{SessionId, TemplateId};
use thiserror::Error;

/// Errors returned synchronously by manual actions and queries
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Template not found: {0}")]
    TemplateNotFound(TemplateId),

    #[error("Action {action} is not allowed while the session is {state}")]
    ActionNotAllowed {
        state: LifecycleState,
        action: ActionTarget,
    },

    #[error("Session {session_id} is no longer {expected}")]
    StatusConflict {
        session_id: SessionId,
        expected: SessionStatus,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<cadence_api::InvalidValue> for CoreError {
    fn from(e: cadence_api::InvalidValue) -> Self {
        CoreError::Validation(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that fail a maintenance sweep as a whole
#[derive(Debug, Error)]
pub enum SweepError {
    /// The store is not usable; no phase ran
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Another sweep holds the single-flight guard
    #[error("A maintenance sweep is already running")]
    AlreadyRunning,

    /// Horizon extension failed or timed out
    #[error("Materialization failed: {details}")]
    Materialization { details: String },
}
