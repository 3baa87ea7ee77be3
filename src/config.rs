//! Configuration module for newsrelay.

use serde::Deserialize;
use std::path::Path;

use crate::scheduler::{MAX_INTERVAL, MIN_INTERVAL_FLOOR};
use crate::{RelayError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/newsrelay.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/newsrelay.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Delivery scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between scheduled ticks in seconds.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Smallest interval accepted at runtime.
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
    /// How long an in-flight tick may keep running after shutdown is requested.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// Seen entries older than this many days are pruned (0 = keep forever).
    #[serde(default)]
    pub retention_days: u32,
}

fn default_interval() -> u64 {
    1800 // 30 minutes
}

fn default_min_interval() -> u64 {
    60
}

fn default_shutdown_grace() -> u64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            min_interval_secs: default_min_interval(),
            shutdown_grace_secs: default_shutdown_grace(),
            retention_days: 0,
        }
    }
}

/// Subscription and polling limits.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Maximum subscriptions a single channel may hold.
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_channel: usize,
    /// Number of most recent entries considered per poll.
    #[serde(default = "default_max_entries")]
    pub max_entries_per_poll: usize,
    /// Probe the feed before accepting a subscription.
    #[serde(default = "default_validate_on_subscribe")]
    pub validate_on_subscribe: bool,
    /// Consecutive fetch failures after which owning channels are told (0 = never).
    #[serde(default)]
    pub failure_alert_threshold: u32,
}

fn default_max_subscriptions() -> usize {
    10
}

fn default_max_entries() -> usize {
    5
}

fn default_validate_on_subscribe() -> bool {
    true
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_subscriptions_per_channel: default_max_subscriptions(),
            max_entries_per_poll: default_max_entries(),
            validate_on_subscribe: default_validate_on_subscribe(),
            failure_alert_threshold: 0,
        }
    }
}

/// HTTP feed fetcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Allow feeds on loopback/private addresses.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            max_feed_size_bytes: default_max_feed_size(),
            allow_private_hosts: false,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Subscription and polling limits.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Feed fetcher configuration.
    #[serde(default)]
    pub fetcher: FetcherConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RelayError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayError::Validation(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `NEWSRELAY_DB_PATH`: Override the database path
    /// - `NEWSRELAY_LOG_LEVEL`: Override the log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("NEWSRELAY_DB_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(level) = std::env::var("NEWSRELAY_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.min_interval_secs < MIN_INTERVAL_FLOOR.as_secs() {
            return Err(RelayError::Config(format!(
                "scheduler.min_interval_secs must be at least {}",
                MIN_INTERVAL_FLOOR.as_secs()
            )));
        }
        if self.scheduler.interval_secs > MAX_INTERVAL.as_secs() {
            return Err(RelayError::Config(format!(
                "scheduler.interval_secs ({}) is above the maximum of {} seconds",
                self.scheduler.interval_secs,
                MAX_INTERVAL.as_secs()
            )));
        }
        if self.scheduler.interval_secs < self.scheduler.min_interval_secs {
            return Err(RelayError::Config(format!(
                "scheduler.interval_secs ({}) is below the minimum of {} seconds",
                self.scheduler.interval_secs, self.scheduler.min_interval_secs
            )));
        }
        if self.relay.max_entries_per_poll == 0 {
            return Err(RelayError::Config(
                "relay.max_entries_per_poll must be positive".to_string(),
            ));
        }
        if self.relay.max_subscriptions_per_channel == 0 {
            return Err(RelayError::Config(
                "relay.max_subscriptions_per_channel must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
