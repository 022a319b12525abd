//! Config validation CLI tool
//!
//! Validates a cadence configuration file and reports any errors.

use cadence_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a cadence configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match cadence_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", cadence_config::CURRENT_CONFIG_VERSION);
            println!("  Database: {}", config.service.database_path().display());
            println!("  Trigger bind: {}", config.service.bind);
            println!("  Daily sweep at: {}", config.service.sweep_at);
            println!(
                "  Horizon: {} days, retention: {} days, phase timeout: {}s",
                config.sweep.horizon_days,
                config.sweep.retention_days,
                config.sweep.phase_timeout.as_secs()
            );
            println!(
                "  Check-in opens {} min before start, reflection grace {} min",
                config.lifecycle.checkin_lead.num_minutes(),
                config.lifecycle.reflection_grace.num_minutes()
            );
            if config.service.cron_secret().is_none() {
                println!();
                println!(
                    "Note: ${} is not set, the maintenance trigger will accept any caller",
                    config.service.cron_secret_env
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                cadence_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                cadence_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                cadence_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                cadence_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        cadence_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
