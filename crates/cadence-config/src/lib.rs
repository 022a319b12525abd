//! Configuration parsing and validation for cadence
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Service settings (data directory, trigger address, cron secret, sweep time)
//! - Sweep horizon, retention and phase timeouts
//! - Lifecycle timing (check-in lead, reflection grace)
//! - Default rating labels
//! - Validation with clear error messages

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ServiceConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<ServiceConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(ServiceConfig::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let config = parse_config("config_version = 1").unwrap();
        assert_eq!(config.sweep.horizon_days, 7);
        assert_eq!(config.sweep.retention_days, 30);
        assert_eq!(config.lifecycle.checkin_lead, chrono::Duration::minutes(60));
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values_with_all_errors() {
        let config = r#"
            config_version = 1

            [service]
            sweep_at = "25:00"
            bind = "not an address"

            [sweep]
            horizon_days = 0
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn reject_retention_beyond_calendar() {
        let result = parse_config("config_version = 1\n[sweep]\nretention_days = 4000000000");
        match result {
            Err(ConfigError::ValidationFailed { errors }) => assert!(matches!(
                errors.as_slice(),
                [ValidationError::TooLarge { field: "sweep.retention_days", .. }]
            )),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            config_version = 1

            [sweep]
            retention_days = 14
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.sweep.retention_days, 14);
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = load_config("/nonexistent/cadence/config.toml");
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
