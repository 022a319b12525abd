//! Default paths for cadence components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/cadence/config.toml` or `~/.config/cadence/config.toml`
//! - Data: `$XDG_DATA_HOME/cadence` or `~/.local/share/cadence`

use std::path::PathBuf;

/// Environment variable for overriding the config file
pub const CADENCE_CONFIG_ENV: &str = "CADENCE_CONFIG";

/// Application subdirectory name
const APP_DIR: &str = "cadence";

/// SQLite database filename within the data directory
pub const DATABASE_FILENAME: &str = "cadence.db";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$CADENCE_CONFIG` environment variable (if set)
/// 2. the platform config dir (`$XDG_CONFIG_HOME` or `~/.config`)
/// 3. `/etc/cadence/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CADENCE_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    match dirs::config_dir() {
        Some(dir) => dir.join(APP_DIR).join("config.toml"),
        None => PathBuf::from("/etc").join(APP_DIR).join("config.toml"),
    }
}

/// Get the default data directory: the platform data dir
/// (`$XDG_DATA_HOME` or `~/.local/share`), else `/tmp/cadence/data`.
///
/// `CADENCE_DATA_DIR` is honoured by the CLI, not here.
pub fn default_data_dir() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join(APP_DIR),
        None => PathBuf::from("/tmp").join(APP_DIR).join("data"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_ends_with_config_toml() {
        let path = default_config_path();
        if std::env::var(CADENCE_CONFIG_ENV).is_err() {
            assert!(path.ends_with("cadence/config.toml"));
        }
    }

    #[test]
    fn data_dir_is_app_scoped() {
        assert!(default_data_dir().to_string_lossy().contains(APP_DIR));
    }
}
