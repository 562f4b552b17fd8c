//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via RCOND_CONFIG)
//! 3. Environment variables

use crate::service::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default maximum number of simultaneous RCON clients.
pub const DEFAULT_MAX_CLIENTS: usize = 50;

/// Default time a new connection has to log in.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound on one readiness wait of the worker loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RCON listener configuration.
    pub rcon: RconConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("RCOND_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.rcon.apply_env_overrides();
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rcon.validate()
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// RCON listener configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Shared password clients log in with. Must not be empty.
    pub password: String,
    /// Maximum simultaneous connections, authenticated or not.
    pub max_clients: usize,
    /// Time a new connection has to log in, in milliseconds.
    pub auth_timeout_ms: u64,
    /// Upper bound on one readiness wait of the worker loop, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], rcond_protocol::DEFAULT_PORT)),
            password: String::new(),
            max_clients: DEFAULT_MAX_CLIENTS,
            auth_timeout_ms: DEFAULT_AUTH_TIMEOUT.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl std::fmt::Debug for RconConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconConfig")
            .field("bind_addr", &self.bind_addr)
            .field("password", &"<redacted>")
            .field("max_clients", &self.max_clients)
            .field("auth_timeout_ms", &self.auth_timeout_ms)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .finish()
    }
}

impl RconConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("RCOND_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(password) = std::env::var("RCOND_PASSWORD") {
            self.password = password;
        }

        if let Ok(max) = std::env::var("RCOND_MAX_CLIENTS") {
            if let Ok(n) = max.parse() {
                self.max_clients = n;
            }
        }

        if let Ok(timeout) = std::env::var("RCOND_AUTH_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.auth_timeout_ms = ms;
            }
        }

        if let Ok(interval) = std::env::var("RCOND_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.poll_interval_ms = ms;
            }
        }
    }

    /// Returns the auth timeout as Duration.
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    /// Returns the poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validates the listener configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_service_config().validate()
    }

    /// Converts to the programmatic form taken by `RconService::start`.
    pub fn to_service_config(&self) -> ServiceConfig {
        ServiceConfig::new(self.password.clone(), self.bind_addr)
            .with_max_clients(self.max_clients)
            .with_auth_timeout(self.auth_timeout())
            .with_poll_interval(self.poll_interval())
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
