use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use super::{Error, Result};

/// Environment variable overriding [`Config::peer_host`]
pub const ENV_PEER_HOST: &str = "GATEWAY_PEER_HOST";
/// Environment variable overriding [`Config::peer_port`]
pub const ENV_PEER_PORT: &str = "GATEWAY_PEER_PORT";
/// Environment variable overriding [`Config::reconnect_delay`] (milliseconds)
pub const ENV_RECONNECT_DELAY_MS: &str = "GATEWAY_RECONNECT_DELAY_MS";

/// Addressing triple identifying a device on the PAN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// PAN identifier
    pub pan_id: u16,
    /// 16-bit network address
    pub short_address: u16,
    /// 64-bit IEEE address
    #[serde(serialize_with = "super::serde::serialize_ext_address")]
    #[serde(deserialize_with = "super::serde::deserialize_ext_address")]
    pub ext_address: u64,
}

/// Configuration for the gateway protocol client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host of the application server
    pub peer_host: String,
    /// TCP port of the application server
    pub peer_port: u16,
    /// Delay before reconnecting after the socket fails
    #[serde(serialize_with = "super::serde::serialize_duration_ms")]
    #[serde(deserialize_with = "super::serde::deserialize_duration_ms")]
    pub reconnect_delay: Duration,
    /// Longest a single TCP connect attempt may take
    #[serde(serialize_with = "super::serde::serialize_duration_ms")]
    #[serde(deserialize_with = "super::serde::deserialize_duration_ms")]
    pub connect_timeout: Duration,
    /// Idle time before TCP keepalive probes start
    #[serde(serialize_with = "super::serde::serialize_duration_ms")]
    #[serde(deserialize_with = "super::serde::deserialize_duration_ms")]
    pub keepalive: Duration,
    /// Capacity of the request channel into the client task
    pub command_capacity: usize,
    /// Capacity of the event broadcast queue
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            peer_host: super::DEFAULT_HOST.to_string(),
            peer_port: super::DEFAULT_PORT,
            reconnect_delay: super::DEFAULT_RECONNECT_DELAY,
            connect_timeout: Duration::from_secs(10),
            keepalive: Duration::from_secs(30),
            command_capacity: 64,
            event_capacity: 128,
        }
    }
}

impl Config {
    /// Parses a configuration from JSON; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config = Self::parse_json(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::read_json_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the startup configuration: file (if given), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load) with overrides taken from `lookup`
    ///
    /// Validation runs once, after the overrides are applied.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::read_json_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("Invalid configuration: {}", e)))
    }

    fn read_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse_json(&json)
    }

    /// Applies `GATEWAY_*` overrides obtained through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_PEER_HOST) {
            self.peer_host = host;
        }
        if let Some(port) = lookup(ENV_PEER_PORT) {
            self.peer_port = port
                .trim()
                .parse()
                .map_err(|e| Error::config(format!("{}={}: {}", ENV_PEER_PORT, port, e)))?;
        }
        if let Some(delay) = lookup(ENV_RECONNECT_DELAY_MS) {
            let millis: u64 = delay
                .trim()
                .parse()
                .map_err(|e| Error::config(format!("{}={}: {}", ENV_RECONNECT_DELAY_MS, delay, e)))?;
            self.reconnect_delay = Duration::from_millis(millis);
        }
        Ok(())
    }

    /// Checks the values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.peer_host.trim().is_empty() {
            return Err(Error::config("peer_host must not be empty"));
        }
        if self.peer_port == 0 {
            return Err(Error::config("peer_port must not be 0"));
        }
        if self.reconnect_delay.is_zero() {
            return Err(Error::config("reconnect_delay must be positive"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout must be positive"));
        }
        if self.command_capacity == 0 || self.event_capacity == 0 {
            return Err(Error::config("channel capacities must be positive"));
        }
        Ok(())
    }

    /// `host:port` of the application server
    pub fn peer_addr(&self) -> String {
        format!("{}:{}", self.peer_host, self.peer_port)
    }
}
