//! Operator-level settings
//!
//! Defaults that apply across all crawlers: where the store database lives,
//! where pipeline definitions are found, and the global incremental/expiry
//! policy. Loaded from an optional TOML file, with environment variables
//! taking precedence over file values.

use crate::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Global settings shared by the CLI and the worker
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Path of the SQLite store database
    pub database_path: String,

    /// Directory of pipeline definition files
    pub config_dir: String,

    /// Default for the `incremental` flag of new runs
    pub incremental: bool,

    /// Default expiry in days for crawlers that do not set `expire`
    pub default_expire_days: u64,

    /// Worker idle poll interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: "./trellis.db".to_string(),
            config_dir: "./pipelines".to_string(),
            incremental: true,
            default_expire_days: 1,
            poll_interval_ms: 500,
        }
    }
}

impl Settings {
    /// Loads settings from an optional TOML file, then applies env overrides
    ///
    /// Recognized environment variables: `TRELLIS_DB`, `TRELLIS_CONFIG_DIR`,
    /// `TRELLIS_INCREMENTAL`, `TRELLIS_EXPIRE_DAYS`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };

        if let Ok(db) = std::env::var("TRELLIS_DB") {
            settings.database_path = db;
        }
        if let Ok(dir) = std::env::var("TRELLIS_CONFIG_DIR") {
            settings.config_dir = dir;
        }
        if let Ok(incremental) = std::env::var("TRELLIS_INCREMENTAL") {
            settings.incremental = matches!(incremental.as_str(), "1" | "true" | "yes");
        }
        if let Ok(days) = std::env::var("TRELLIS_EXPIRE_DAYS") {
            settings.default_expire_days = days.parse().map_err(|_| {
                ConfigError::Validation(format!("TRELLIS_EXPIRE_DAYS must be an integer, got '{days}'"))
            })?;
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.incremental);
        assert_eq!(settings.default_expire_days, 1);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "database-path = \"/var/lib/trellis/store.db\"\nincremental = false\n"
        )
        .unwrap();
        file.flush().unwrap();

        // serde(default) fills the rest
        let settings: Settings =
            toml::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(settings.database_path, "/var/lib/trellis/store.db");
        assert!(!settings.incremental);
        assert_eq!(settings.poll_interval_ms, 500);
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "database-path = [broken").unwrap();
        file.flush().unwrap();

        let result = Settings::load(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::Settings(_))));
    }
}
