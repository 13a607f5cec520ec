// Server configuration.
//
// `ServerConfig` carries every tunable of the match server. All fields have
// defaults (see `Default`), and a JSON file may override any subset of them:
// missing keys fall back to the default value. The host binary loads the file
// with `ServerConfig::from_json_file` and then applies command-line overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Port used when neither the command line nor a config file names one.
pub const DEFAULT_PORT: u16 = 8787;

/// Seconds each turn lasts before the server forces `END_TURN`.
pub const DEFAULT_TURN_SECONDS: u16 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("tick_interval_ms must be greater than zero")]
    ZeroTick,
}

/// Configuration for a match server.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Length of one turn, in timer ticks.
    pub turn_seconds: u16,
    /// Duration of one timer tick. One second in production; tests shrink it.
    pub tick_interval_ms: u64,
    /// Listen for a fresh pair of players after a match ends.
    pub rearm: bool,
    /// How long a freshly accepted connection may take to send its
    /// `VERSION` record. `None` waits forever.
    pub handshake_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            turn_seconds: DEFAULT_TURN_SECONDS,
            tick_interval_ms: 1000,
            rearm: true,
            handshake_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }
}
