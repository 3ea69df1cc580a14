use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JWT secret key used to validate session tokens
    pub auth_jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    /// Seconds before an untouched drag-item lock is considered abandoned
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Period of the background lock sweeper
    #[serde(default = "default_lock_sweep_interval_secs")]
    pub lock_sweep_interval_secs: u64,

    /// Read deadline, refreshed on every pong
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,

    /// Deadline for a single outbound frame
    #[serde(default = "default_write_wait_secs")]
    pub write_wait_secs: u64,

    /// Largest inbound frame accepted from a client, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Capacity of each session's outbound queue
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// Immediate retries for a failed outbound frame
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        envy::from_env::<Config>().map_err(ConfigError::EnvError)
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Timing and sizing knobs for the synchronization layer
    pub fn sync_settings(&self) -> SyncSettings {
        let pong_wait = Duration::from_secs(self.pong_wait_secs.max(1));
        SyncSettings {
            lock_ttl: Duration::from_secs(self.lock_ttl_secs),
            lock_sweep_interval: Duration::from_secs(self.lock_sweep_interval_secs.max(1)),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            write_wait: Duration::from_secs(self.write_wait_secs.max(1)),
            max_message_size: self.max_message_size,
            outbound_queue_capacity: self.outbound_queue_capacity.max(1),
            write_retries: self.write_retries,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            auth_jwt_secret: None,
            db_url: None,
            lock_ttl_secs: default_lock_ttl_secs(),
            lock_sweep_interval_secs: default_lock_sweep_interval_secs(),
            pong_wait_secs: default_pong_wait_secs(),
            write_wait_secs: default_write_wait_secs(),
            max_message_size: default_max_message_size(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            write_retries: default_write_retries(),
        }
    }
}

/// Resolved durations and limits used by sessions, rooms and the lock table.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub lock_ttl: Duration,
    pub lock_sweep_interval: Duration,
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub write_wait: Duration,
    pub max_message_size: usize,
    pub outbound_queue_capacity: usize,
    pub write_retries: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Config::default().sync_settings()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_lock_ttl_secs() -> u64 {
    30
}

fn default_lock_sweep_interval_secs() -> u64 {
    60
}

fn default_pong_wait_secs() -> u64 {
    60
}

fn default_write_wait_secs() -> u64 {
    10
}

fn default_max_message_size() -> usize {
    512
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_write_retries() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_reference_timings() {
        let settings = Config::default().sync_settings();
        assert_eq!(settings.lock_ttl, Duration::from_secs(30));
        assert_eq!(settings.pong_wait, Duration::from_secs(60));
        assert_eq!(settings.ping_period, Duration::from_secs(54));
        assert_eq!(settings.write_wait, Duration::from_secs(10));
        assert_eq!(settings.max_message_size, 512);
        assert_eq!(settings.outbound_queue_capacity, 256);
    }

    #[test]
    fn zero_queue_capacity_is_clamped() {
        let config = Config { outbound_queue_capacity: 0, ..Config::default() };
        assert_eq!(config.sync_settings().outbound_queue_capacity, 1);
    }
}
