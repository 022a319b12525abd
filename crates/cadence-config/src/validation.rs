//! Configuration validation

use crate::schema::{RawConfig, RawRatingLabels};
use cadence_util::WallClock;
use std::net::SocketAddr;
use thiserror::Error;

pub const MAX_HORIZON_DAYS: u32 = 366;
pub const MAX_RETENTION_DAYS: u32 = 3650;
pub const MAX_PHASE_TIMEOUT_SECONDS: u64 = 3600;
/// Bound for the check-in lead and the reflection grace
pub const MAX_LIFECYCLE_MINUTES: u32 = 24 * 60;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must be at most {max}, found {value}")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("Rating labels '{scale}': {message}")]
    InvalidRatingLabels { scale: &'static str, message: String },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration, collecting every problem found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(sweep_at) = &config.service.sweep_at {
        if let Err(e) = sweep_at.parse::<WallClock>() {
            errors.push(ValidationError::InvalidTimeFormat {
                value: sweep_at.clone(),
                message: e.to_string(),
            });
        }
    }

    if let Some(bind) = &config.service.bind {
        if bind.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidBindAddress(bind.clone()));
        }
    }

    if let Some(name) = &config.service.cron_secret_env {
        if name.trim().is_empty() {
            errors.push(ValidationError::GlobalError(
                "cron_secret_env cannot be empty".into(),
            ));
        }
    }

    check_bounded(
        &mut errors,
        "sweep.horizon_days",
        config.sweep.horizon_days.map(u64::from),
        MAX_HORIZON_DAYS.into(),
    );
    check_bounded(
        &mut errors,
        "sweep.retention_days",
        config.sweep.retention_days.map(u64::from),
        MAX_RETENTION_DAYS.into(),
    );
    check_bounded(
        &mut errors,
        "sweep.phase_timeout_seconds",
        config.sweep.phase_timeout_seconds,
        MAX_PHASE_TIMEOUT_SECONDS,
    );
    if let Some(reason) = &config.sweep.absence_reason {
        if reason.trim().is_empty() {
            errors.push(ValidationError::GlobalError(
                "sweep.absence_reason cannot be empty".into(),
            ));
        }
    }

    check_bounded(
        &mut errors,
        "lifecycle.checkin_lead_minutes",
        config.lifecycle.checkin_lead_minutes.map(u64::from),
        MAX_LIFECYCLE_MINUTES.into(),
    );
    // Zero grace is allowed: sessions go overdue as soon as they end
    if let Some(grace) = config.lifecycle.reflection_grace_minutes {
        if grace > MAX_LIFECYCLE_MINUTES {
            errors.push(ValidationError::TooLarge {
                field: "lifecycle.reflection_grace_minutes",
                value: grace.into(),
                max: MAX_LIFECYCLE_MINUTES.into(),
            });
        }
    }

    if let Some(labels) = &config.rating_labels {
        errors.extend(validate_rating_labels(labels));
    }

    errors
}

fn check_bounded(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: Option<u64>,
    max: u64,
) {
    match value {
        Some(0) => errors.push(ValidationError::NotPositive { field }),
        Some(value) if value > max => errors.push(ValidationError::TooLarge { field, value, max }),
        _ => {}
    }
}

fn validate_rating_labels(labels: &RawRatingLabels) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (scale, list) in [("energy", &labels.energy), ("mindset", &labels.mindset)] {
        let Some(list) = list else { continue };
        if list.len() != 5 {
            errors.push(ValidationError::InvalidRatingLabels {
                scale,
                message: format!("expected 5 labels, found {}", list.len()),
            });
        } else if list.iter().any(|l| l.trim().is_empty()) {
            errors.push(ValidationError::InvalidRatingLabels {
                scale,
                message: "labels cannot be empty".into(),
            });
        }
    }
    errors
}
