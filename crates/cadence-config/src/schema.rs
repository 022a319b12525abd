//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Maintenance sweep settings
    #[serde(default)]
    pub sweep: RawSweepConfig,

    /// Lifecycle timing
    #[serde(default)]
    pub lifecycle: RawLifecycleConfig,

    /// Default rating labels for athletes without their own
    #[serde(default)]
    pub rating_labels: Option<RawRatingLabels>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the SQLite store
    pub data_dir: Option<PathBuf>,

    /// HTTP trigger bind address (default: 127.0.0.1:8787)
    pub bind: Option<String>,

    /// Name of the environment variable holding the trigger's bearer secret
    pub cron_secret_env: Option<String>,

    /// Local time of the daily scheduled sweep (HH:MM)
    pub sweep_at: Option<String>,
}

/// Maintenance sweep settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSweepConfig {
    /// Days ahead of today that must always be materialized
    pub horizon_days: Option<u32>,

    /// Age in days after which resolved sessions are pruned
    pub retention_days: Option<u32>,

    /// Upper bound for each sweep phase, in seconds
    pub phase_timeout_seconds: Option<u64>,

    /// Reason recorded on sessions the sweep marks absent
    pub absence_reason: Option<String>,
}

/// Lifecycle timing
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLifecycleConfig {
    /// Minutes before start that the check-in window opens
    pub checkin_lead_minutes: Option<u32>,

    /// Minutes after the end that reflection stays open before a session is overdue
    pub reflection_grace_minutes: Option<u32>,
}

/// Rating labels; each list must hold exactly five labels
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRatingLabels {
    pub energy: Option<Vec<String>>,
    pub mindset: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [service]
            data_dir = "/var/lib/cadence"
            bind = "0.0.0.0:8080"
            cron_secret_env = "CRON_SECRET"
            sweep_at = "00:05"

            [sweep]
            horizon_days = 7
            retention_days = 30
            phase_timeout_seconds = 20
            absence_reason = "Missed"

            [lifecycle]
            checkin_lead_minutes = 45
            reflection_grace_minutes = 90

            [rating_labels]
            energy = ["1", "2", "3", "4", "5"]
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.bind.as_deref(), Some("0.0.0.0:8080"));
        assert_eq!(config.sweep.phase_timeout_seconds, Some(20));
        assert_eq!(config.lifecycle.checkin_lead_minutes, Some(45));
        let labels = config.rating_labels.unwrap();
        assert_eq!(labels.energy.unwrap().len(), 5);
        assert!(labels.mindset.is_none());
    }

    #[test]
    fn sections_are_optional() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.service.data_dir.is_none());
        assert!(config.rating_labels.is_none());
    }
}
