use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error_handling::types::ConfigError;

/// Runtime configuration loaded from a TOML file.
///
/// Every field has a default so a minimal deployment can run from an empty
/// file; `validate` rejects values the server cannot start with.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP API binds to.
    pub bind_address: String,

    /// Port the HTTP API listens on.
    pub port: u16,

    /// SQLite database file path.
    pub database_path: PathBuf,

    /// History rows older than this many months are moved to the archive
    /// table by the background job.
    pub retention_months: u32,

    /// Number of history rows archived per transaction.
    pub archive_batch_size: u64,

    /// Seconds between archival runs.
    pub archive_interval_secs: u64,

    /// Upper bound on events returned by the change-polling endpoint.
    pub changes_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            database_path: PathBuf::from("sesame.sqlite3"),
            retention_months: 13,
            archive_batch_size: 500,
            archive_interval_secs: 86_400,
            changes_limit: 200,
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::BadBindAddress(format!(
                "'{}' is not an IP address",
                self.bind_address
            )));
        }
        if self.port < 1024 {
            return Err(ConfigError::BadPortsRange(format!(
                "port {} is reserved",
                self.port
            )));
        }
        if self.retention_months == 0 {
            return Err(ConfigError::BadRetention(
                "retention_months must be at least 1".to_string(),
            ));
        }
        if self.archive_batch_size == 0 {
            return Err(ConfigError::BadBatchSize(
                "archive_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
