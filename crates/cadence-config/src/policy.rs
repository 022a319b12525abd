//! Validated configuration structures

use crate::schema::{RawConfig, RawLifecycleConfig, RawRatingLabels, RawServiceConfig, RawSweepConfig};
use cadence_api::{RatingLabels, RatingScale};
use cadence_util::{default_data_dir, WallClock, DATABASE_FILENAME};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default absence reason written by overdue reconciliation
pub const DEFAULT_ABSENCE_REASON: &str =
    "Automatically marked absent: session ended without being resolved";

/// Validated configuration ready for use by the service
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub service: ServicePolicy,
    pub sweep: SweepPolicy,
    pub lifecycle: LifecyclePolicy,
    pub rating_labels: RatingLabels,
}

impl ServiceConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServicePolicy::from_raw(raw.service),
            sweep: SweepPolicy::from_raw(raw.sweep),
            lifecycle: LifecyclePolicy::from_raw(raw.lifecycle),
            rating_labels: convert_rating_labels(raw.rating_labels),
        }
    }
}

/// Service-level settings
#[derive(Debug, Clone)]
pub struct ServicePolicy {
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    pub cron_secret_env: String,
    pub sweep_at: WallClock,
}

impl ServicePolicy {
    fn from_raw(raw: RawServiceConfig) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
            bind: raw
                .bind
                .and_then(|b| b.parse().ok())
                .unwrap_or(defaults.bind),
            cron_secret_env: raw.cron_secret_env.unwrap_or(defaults.cron_secret_env),
            sweep_at: raw
                .sweep_at
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sweep_at),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILENAME)
    }

    /// Resolve the trigger secret from the environment.
    ///
    /// `None` means no secret is configured and the trigger is open.
    pub fn cron_secret(&self) -> Option<String> {
        std::env::var(&self.cron_secret_env)
            .ok()
            .filter(|s| !s.is_empty())
    }
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 8787)),
            cron_secret_env: "CRON_SECRET".into(),
            // Late enough that sessions ending around midnight are past the
            // default reflection grace when overdue reconciliation runs
            sweep_at: WallClock { hour: 3, minute: 0 },
        }
    }
}

/// Maintenance sweep settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPolicy {
    /// Materialize `[today, today + horizon_days]`
    pub horizon_days: u32,
    /// Resolved sessions older than this many days are pruned
    pub retention_days: u32,
    /// Upper bound for each phase; a timeout counts as a phase failure
    pub phase_timeout: Duration,
    pub absence_reason: String,
}

impl SweepPolicy {
    fn from_raw(raw: RawSweepConfig) -> Self {
        let defaults = Self::default();
        Self {
            horizon_days: raw.horizon_days.unwrap_or(defaults.horizon_days),
            retention_days: raw.retention_days.unwrap_or(defaults.retention_days),
            phase_timeout: raw
                .phase_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.phase_timeout),
            absence_reason: raw.absence_reason.unwrap_or(defaults.absence_reason),
        }
    }
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            horizon_days: 7,
            retention_days: 30,
            phase_timeout: Duration::from_secs(30),
            absence_reason: DEFAULT_ABSENCE_REASON.into(),
        }
    }
}

/// Lifecycle timing used by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// How long before start the check-in window opens
    pub checkin_lead: chrono::Duration,
    /// How long after the end a checked-in session may still be reflected on
    pub reflection_grace: chrono::Duration,
}

impl LifecyclePolicy {
    fn from_raw(raw: RawLifecycleConfig) -> Self {
        let defaults = Self::default();
        Self {
            checkin_lead: raw
                .checkin_lead_minutes
                .map(|m| chrono::Duration::minutes(m as i64))
                .unwrap_or(defaults.checkin_lead),
            reflection_grace: raw
                .reflection_grace_minutes
                .map(|m| chrono::Duration::minutes(m as i64))
                .unwrap_or(defaults.reflection_grace),
        }
    }
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            checkin_lead: chrono::Duration::minutes(60),
            reflection_grace: chrono::Duration::minutes(120),
        }
    }
}

fn convert_rating_labels(raw: Option<RawRatingLabels>) -> RatingLabels {
    let mut labels = RatingLabels::default();
    let Some(raw) = raw else {
        return labels;
    };
    if let Some(scale) = raw.energy.and_then(to_scale) {
        labels.energy = scale;
    }
    if let Some(scale) = raw.mindset.and_then(to_scale) {
        labels.mindset = scale;
    }
    labels
}

fn to_scale(list: Vec<String>) -> Option<RatingScale> {
    <[String; 5]>::try_from(list).ok().map(RatingScale)
}
