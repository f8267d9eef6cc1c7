//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::server::WorkerSettings;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// UDP port the server listens on
    pub server_port: u16,
    /// Maximum concurrently processing tasks, 0 = unlimited
    pub max_concurrent_tasks: usize,
    /// Capacity in bytes of the bootstrapped default environment
    pub default_max_size: u64,
    /// Security key of the bootstrapped default environment
    pub default_security_key: String,
    /// Directory for persisted items, None disables persistence
    pub data_dir: Option<PathBuf>,
    /// Directory holding log files, None disables log retention
    pub log_dir: Option<PathBuf>,
    /// Log files older than this many days are removed
    pub max_log_days: u32,
    /// Expiry sweep cadence in seconds
    pub expiry_sweep_secs: u64,
    /// Capacity warning check cadence in seconds
    pub capacity_check_secs: u64,
    /// Log retention sweep cadence in seconds
    pub log_retention_secs: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - UDP listen port (default: 11000)
    /// - `MAX_CONCURRENT_TASKS` - Concurrency budget, 0 = unlimited (default: 10)
    /// - `DEFAULT_MAX_SIZE` - Default environment capacity in bytes (default: 1 GiB)
    /// - `DEFAULT_SECURITY_KEY` - Default environment security key (default: "default")
    /// - `DATA_DIR` - Persistence directory (default: persistence disabled)
    /// - `LOG_DIR` - Log file directory (default: retention disabled)
    /// - `MAX_LOG_DAYS` - Log retention window in days (default: 30)
    /// - `EXPIRY_SWEEP_SECS` - Expiry sweep cadence (default: 30)
    /// - `CAPACITY_CHECK_SECS` - Capacity check cadence (default: 600)
    /// - `LOG_RETENTION_SECS` - Log retention cadence (default: 43200)
    pub fn from_env() -> Self {
        Self {
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(11000),
            max_concurrent_tasks: env::var("MAX_CONCURRENT_TASKS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            default_max_size: env::var("DEFAULT_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1024 * 1024 * 1024),
            default_security_key: env::var("DEFAULT_SECURITY_KEY")
                .unwrap_or_else(|_| "default".to_string()),
            data_dir: env::var("DATA_DIR").ok().map(PathBuf::from),
            log_dir: env::var("LOG_DIR").ok().map(PathBuf::from),
            max_log_days: env::var("MAX_LOG_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            expiry_sweep_secs: env::var("EXPIRY_SWEEP_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            capacity_check_secs: env::var("CAPACITY_CHECK_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
            log_retention_secs: env::var("LOG_RETENTION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(12 * 60 * 60),
        }
    }

    /// Worker scheduling settings derived from this configuration.
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            max_concurrent_tasks: self.max_concurrent_tasks,
            expiry_sweep_interval: Duration::from_secs(self.expiry_sweep_secs),
            capacity_check_interval: Duration::from_secs(self.capacity_check_secs),
            log_retention_interval: Duration::from_secs(self.log_retention_secs),
            log_dir: self.log_dir.clone(),
            max_log_days: self.max_log_days,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 11000,
            max_concurrent_tasks: 10,
            default_max_size: 1024 * 1024 * 1024,
            default_security_key: "default".to_string(),
            data_dir: None,
            log_dir: None,
            max_log_days: 30,
            expiry_sweep_secs: 30,
            capacity_check_secs: 600,
            log_retention_secs: 12 * 60 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 11000);
        assert_eq!(config.max_concurrent_tasks, 10);
        assert_eq!(config.default_max_size, 1024 * 1024 * 1024);
        assert_eq!(config.default_security_key, "default");
        assert!(config.data_dir.is_none());
        assert_eq!(config.max_log_days, 30);
        assert_eq!(config.expiry_sweep_secs, 30);
    }

    #[test]
    fn test_worker_settings_from_config() {
        let config = Config {
            max_concurrent_tasks: 4,
            expiry_sweep_secs: 5,
            log_dir: Some(PathBuf::from("/var/log/envcache")),
            ..Config::default()
        };
        let settings = config.worker_settings();
        assert_eq!(settings.max_concurrent_tasks, 4);
        assert_eq!(settings.expiry_sweep_interval, Duration::from_secs(5));
        assert_eq!(settings.log_dir, Some(PathBuf::from("/var/log/envcache")));
        assert_eq!(settings.capacity_check_interval, Duration::from_secs(600));
    }
}
