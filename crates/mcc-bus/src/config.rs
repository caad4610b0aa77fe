// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tunables of the bus services.
//!
//! All structs deserialize from partial TOML/JSON tables; missing keys fall
//! back to the defaults below.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::names;

/// Router worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Period of the queue backlog scan (milliseconds).
    #[serde(default = "default_backlog_interval")]
    pub backlog_interval_ms: u64,

    /// Queue depth above which an endpoint is reported.
    #[serde(default = "default_backlog_threshold")]
    pub backlog_threshold: usize,

    /// Ingress receive timeout (milliseconds).
    #[serde(default = "default_router_recv_timeout")]
    pub recv_timeout_ms: u64,
}

fn default_backlog_interval() -> u64 {
    10_000
}

fn default_backlog_threshold() -> usize {
    100
}

fn default_router_recv_timeout() -> u64 {
    1000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            backlog_interval_ms: default_backlog_interval(),
            backlog_threshold: default_backlog_threshold(),
            recv_timeout_ms: default_router_recv_timeout(),
        }
    }
}

impl RouterConfig {
    pub fn backlog_interval(&self) -> Duration {
        Duration::from_millis(self.backlog_interval_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

/// Settings shared by every service loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Inbound receive timeout per tick (milliseconds).
    #[serde(default = "default_service_recv_timeout")]
    pub recv_timeout_ms: u64,
}

fn default_service_recv_timeout() -> u64 {
    100
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            recv_timeout_ms: default_service_recv_timeout(),
        }
    }
}

impl ServiceConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

/// Manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Components that must report "started" before the system is up.
    #[serde(default = "default_required")]
    pub required: Vec<String>,
}

fn default_required() -> Vec<String> {
    vec![
        names::CORE_DB.to_string(),
        names::CORE_CMD.to_string(),
        names::CORE_TM.to_string(),
    ]
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            required: default_required(),
        }
    }
}
