// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon configuration file.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use mcc_bus::{names, ManagerConfig, RouterConfig, ServiceConfig};
use mcc_encoder::{EncoderConfig, NetChannel};
use serde::{Deserialize, Serialize};
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

/// Protocol encoders the daemon can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EncoderKind {
    Internal,
    Mavlink,
    Photon,
}

impl EncoderKind {
    pub fn endpoint(self) -> &'static str {
        match self {
            EncoderKind::Internal => names::ENCODER_INTERNAL,
            EncoderKind::Mavlink => names::ENCODER_MAVLINK,
            EncoderKind::Photon => names::ENCODER_PHOTON,
        }
    }
}

impl FromStr for EncoderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(EncoderKind::Internal),
            "mavlink" => Ok(EncoderKind::Mavlink),
            "photon" => Ok(EncoderKind::Photon),
            _ => Err(ConfigError::Invalid(format!("unknown encoder '{}'", s))),
        }
    }
}

/// Channel created (and optionally opened) once the system is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPreset {
    pub address: String,

    /// `protocol:transport:params`; the protocol selects the encoder.
    pub settings: String,

    #[serde(default = "default_true")]
    pub open: bool,
}

impl ChannelPreset {
    pub fn encoder(&self) -> Result<EncoderKind, ConfigError> {
        let channel: NetChannel = self
            .settings
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("channel '{}': {}", self.address, e)))?;
        channel.protocol.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Default tracing filter, e.g. `info` or `mcc_encoder=debug`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Encoders to run.
    #[serde(default = "default_encoders")]
    pub encoders: Vec<String>,

    /// Extra endpoints to register and monitor.
    #[serde(default)]
    pub endpoints: Vec<String>,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    /// Required components. Defaults to the enabled encoders.
    #[serde(default)]
    pub manager: Option<ManagerConfig>,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub channels: Vec<ChannelPreset>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_encoders() -> Vec<String> {
    vec!["internal".into(), "mavlink".into(), "photon".into()]
}

fn default_true() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            encoders: default_encoders(),
            endpoints: Vec::new(),
            router: RouterConfig::default(),
            service: ServiceConfig::default(),
            manager: None,
            encoder: EncoderConfig::default(),
            channels: Vec::new(),
        }
    }
}

/// Names an extra endpoint may not take.
const RESERVED_ENDPOINTS: [&str; 7] = [
    names::MULTICAST,
    names::CORE_ROUTER,
    names::CORE_MANAGER,
    names::UI,
    names::ENCODER_INTERNAL,
    names::ENCODER_MAVLINK,
    names::ENCODER_PHOTON,
];

/// Endpoints played by external services; the daemon only monitors them.
pub const EXTERNAL_ENDPOINTS: [&str; 3] = [names::CORE_DB, names::CORE_CMD, names::CORE_TM];

impl DaemonConfig {
    /// Load from a TOML file and validate.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Enabled encoders, sorted, without duplicates.
    pub fn encoder_kinds(&self) -> Result<Vec<EncoderKind>, ConfigError> {
        let kinds = self
            .encoders
            .iter()
            .map(|e| e.parse())
            .collect::<Result<BTreeSet<EncoderKind>, _>>()?;
        Ok(kinds.into_iter().collect())
    }

    pub fn manager_config(&self) -> Result<ManagerConfig, ConfigError> {
        if let Some(m) = &self.manager {
            return Ok(m.clone());
        }
        Ok(ManagerConfig {
            required: self
                .encoder_kinds()?
                .into_iter()
                .map(|k| k.endpoint().to_string())
                .collect(),
        })
    }

    /// Every endpoint to register on the router.
    pub fn endpoint_names(&self) -> Result<Vec<String>, ConfigError> {
        let mut all: Vec<String> = [names::CORE_MANAGER, names::UI]
            .iter()
            .chain(EXTERNAL_ENDPOINTS.iter())
            .map(|s| s.to_string())
            .collect();
        all.extend(
            self.encoder_kinds()?
                .into_iter()
                .map(|k| k.endpoint().to_string()),
        );
        for extra in &self.endpoints {
            if !all.contains(extra) {
                all.push(extra.clone());
            }
        }
        Ok(all)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log_level must not be empty".into()));
        }
        let kinds = self.encoder_kinds()?;
        if kinds.is_empty() {
            return Err(ConfigError::Invalid("at least one encoder is required".into()));
        }
        for name in &self.endpoints {
            if name.is_empty() || RESERVED_ENDPOINTS.contains(&name.as_str()) {
                return Err(ConfigError::Invalid(format!("endpoint name '{}' is reserved", name)));
            }
        }
        self.encoder
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let registered = self.endpoint_names()?;
        for required in self.manager_config()?.required {
            if !registered.contains(&required) {
                return Err(ConfigError::Invalid(format!(
                    "required component '{}' is not a registered endpoint",
                    required
                )));
            }
        }

        let mut addresses = BTreeSet::new();
        for preset in &self.channels {
            let kind = preset.encoder()?;
            if !kinds.contains(&kind) {
                return Err(ConfigError::Invalid(format!(
                    "channel '{}' needs the {:?} encoder, which is not enabled",
                    preset.address, kind
                )));
            }
            if !addresses.insert(preset.address.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate channel address '{}'",
                    preset.address
                )));
            }
        }
        Ok(())
    }

    /// Sample written by `gen-config`.
    pub fn example() -> Self {
        Self {
            log_level: "info,mcc_encoder=debug".into(),
            encoders: vec!["internal".into(), "mavlink".into()],
            channels: vec![
                ChannelPreset {
                    address: "vehicle".into(),
                    settings: "Mavlink:udp:127.0.0.1:14550:14551".into(),
                    open: true,
                },
                ChannelPreset {
                    address: "bench".into(),
                    settings: "Internal:com:/dev/ttyUSB0:57600".into(),
                    open: false,
                },
            ],
            ..Self::default()
        }
    }
}
