//! Job configuration for chainsight.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Error
// ─────────────────────────────────────────────────────────────────────────────

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Environment
// ─────────────────────────────────────────────────────────────────────────────

pub const ENV_DATABASE_PATH: &str = "CHAINSIGHT_DATABASE_PATH";
pub const ENV_WORKERS: &str = "CHAINSIGHT_WORKERS";
pub const ENV_LOG: &str = "CHAINSIGHT_LOG";
pub const ENV_INPUT_PATH: &str = "CHAINSIGHT_INPUT";

// ─────────────────────────────────────────────────────────────────────────────
// Job Config
// ─────────────────────────────────────────────────────────────────────────────

/// Settings for one batch analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// SQLite database for chain details and relationships.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Units (traces or groups) processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// JSON file holding the spans to analyse.
    #[serde(default)]
    pub input_path: Option<PathBuf>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/chainsight.db")
}

fn default_workers() -> usize {
    4
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            workers: default_workers(),
            log_filter: default_log_filter(),
            input_path: None,
        }
    }
}

impl JobConfig {
    /// Reads a JSON config file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: JobConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Overrides fields from `CHAINSIGHT_*` environment variables.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(path) = var(ENV_DATABASE_PATH) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(workers) = var(ENV_WORKERS) {
            self.workers = workers.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{ENV_WORKERS} must be a positive integer, got {workers:?}"))
            })?;
        }
        if let Some(filter) = var(ENV_LOG) {
            self.log_filter = filter;
        }
        if let Some(path) = var(ENV_INPUT_PATH) {
            self.input_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter must not be empty".to_string()));
        }
        tracing::debug!(
            database_path = %self.database_path.display(),
            workers = self.workers,
            "Job config validated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = JobConfig::default();
        assert_eq!(config.database_path, PathBuf::from("data/chainsight.db"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.log_filter, "info");
        assert!(config.input_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"workers": 8, "input_path": "spans.json"}}"#).unwrap();

        let config = JobConfig::load(file.path()).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.input_path, Some(PathBuf::from("spans.json")));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            JobConfig::load(Path::new("/definitely/not/here.json")),
            Err(ConfigError::Io(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ workers: ").unwrap();
        assert!(matches!(JobConfig::load(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_DATABASE_PATH, "/tmp/chains.db"),
            (ENV_WORKERS, "2"),
            (ENV_LOG, "chainsight=debug"),
        ]);
        let config = JobConfig::default()
            .apply_vars(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/chains.db"));
        assert_eq!(config.workers, 2);
        assert_eq!(config.log_filter, "chainsight=debug");
        assert!(config.input_path.is_none());
    }

    #[test]
    fn test_invalid_values() {
        let err = JobConfig::default()
            .apply_vars(|name| (name == ENV_WORKERS).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config = JobConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
