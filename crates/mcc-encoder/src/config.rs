// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Encoder tunables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Timing and retry settings of channel managers and device tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// How long a synchronous exchange waits for the reply (milliseconds).
    #[serde(default = "default_sync_response_timeout")]
    pub sync_response_timeout_ms: u64,

    /// Pause after a synchronous pass where no device had data (milliseconds).
    #[serde(default = "default_sync_no_exchange_pause")]
    pub sync_no_exchange_pause_ms: u64,

    /// Receive window of one asynchronous pass (milliseconds).
    #[serde(default = "default_async_sleep_on_receive")]
    pub async_sleep_on_receive_ms: u64,

    /// Request/reply attempts per command.
    #[serde(default = "default_device_tries")]
    pub device_tries: usize,

    /// Pause between two telemetry polls (milliseconds).
    #[serde(default = "default_read_pause")]
    pub read_pause_ms: u64,
}

fn default_sync_response_timeout() -> u64 {
    100
}

fn default_sync_no_exchange_pause() -> u64 {
    1
}

fn default_async_sleep_on_receive() -> u64 {
    100
}

fn default_device_tries() -> usize {
    3
}

fn default_read_pause() -> u64 {
    200
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sync_response_timeout_ms: default_sync_response_timeout(),
            sync_no_exchange_pause_ms: default_sync_no_exchange_pause(),
            async_sleep_on_receive_ms: default_async_sleep_on_receive(),
            device_tries: default_device_tries(),
            read_pause_ms: default_read_pause(),
        }
    }
}

impl EncoderConfig {
    /// Load from a TOML file and validate.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_tries == 0 {
            return Err(ConfigError::Invalid("device_tries must be at least 1".into()));
        }
        if self.sync_response_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sync_response_timeout_ms must be positive".into(),
            ));
        }
        if self.async_sleep_on_receive_ms == 0 {
            return Err(ConfigError::Invalid(
                "async_sleep_on_receive_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn sync_response_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_response_timeout_ms)
    }

    pub fn sync_no_exchange_pause(&self) -> Duration {
        Duration::from_millis(self.sync_no_exchange_pause_ms)
    }

    pub fn async_sleep_on_receive(&self) -> Duration {
        Duration::from_millis(self.async_sleep_on_receive_ms)
    }

    pub fn read_pause(&self) -> Duration {
        Duration::from_millis(self.read_pause_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_from_empty_table() {
        let config: EncoderConfig = toml::from_str("").unwrap();
        assert_eq!(config, EncoderConfig::default());
        assert_eq!(config.device_tries, 3);
        assert_eq!(config.sync_response_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "device_tries = 5\nread_pause_ms = 50").unwrap();
        let config = EncoderConfig::from_file(file.path()).unwrap();
        assert_eq!(config.device_tries, 5);
        assert_eq!(config.read_pause(), Duration::from_millis(50));
        assert_eq!(config.async_sleep_on_receive_ms, 100);
    }

    #[test]
    fn test_rejects_zero_tries() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "device_tries = 0").unwrap();
        assert!(matches!(
            EncoderConfig::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
