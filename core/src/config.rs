//! Driver timing and buffer configuration.
//!
//! Every field has the default the ESP-01 firmware is known to tolerate, so a
//! partial JSON document only needs to name what it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Capacity of the primary and shadow receive buffers, terminator included.
    pub rx_buffer_len: usize,
    pub command_buffer_len: usize,
    pub request_buffer_len: usize,
    pub poll_interval_ms: u64,
    pub boot_delay_ms: u64,
    pub probe_timeout_ms: u64,
    /// Association plus DHCP routinely takes several seconds.
    pub join_timeout_ms: u64,
    pub address_timeout_ms: u64,
    pub address_backoff_ms: u64,
    /// Upper bound on busy-p retries of the address query. `None` retries for
    /// as long as the module keeps answering busy.
    pub max_address_polls: Option<u32>,
    pub open_timeout_ms: u64,
    pub announce_timeout_ms: u64,
    pub push_timeout_ms: u64,
    pub close_timeout_ms: u64,
    pub http_settle_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            rx_buffer_len: 128,
            command_buffer_len: 128,
            request_buffer_len: 512,
            poll_interval_ms: 1,
            boot_delay_ms: 1000,
            probe_timeout_ms: 1000,
            join_timeout_ms: 15_000,
            address_timeout_ms: 2000,
            address_backoff_ms: 200,
            max_address_polls: Some(50),
            open_timeout_ms: 5000,
            announce_timeout_ms: 5000,
            push_timeout_ms: 5000,
            close_timeout_ms: 2000,
            http_settle_ms: 250,
        }
    }
}

impl DriverConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: DriverConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rx_buffer_len < 2 {
            return Err(ConfigError::Invalid("rx_buffer_len must leave room for a terminator"));
        }
        if self.command_buffer_len == 0 {
            return Err(ConfigError::Invalid("command_buffer_len must be non-zero"));
        }
        if self.request_buffer_len == 0 {
            return Err(ConfigError::Invalid("request_buffer_len must be non-zero"));
        }
        Ok(())
    }
}
