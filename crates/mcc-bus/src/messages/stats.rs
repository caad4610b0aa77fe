// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Traffic counters for channels and devices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Packet and byte counter with the time of the last update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub packets: u64,
    pub bytes: u64,
    pub time: DateTime<Utc>,
}

impl Default for Stat {
    fn default() -> Self {
        Self {
            packets: 0,
            bytes: 0,
            time: Utc::now(),
        }
    }
}

impl Stat {
    /// Account `bytes`; `is_packet` also bumps the packet count.
    pub fn add(&mut self, bytes: usize, is_packet: bool) {
        self.bytes += bytes as u64;
        if is_packet {
            self.packets += 1;
        }
        self.time = Utc::now();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Snapshot of one physical channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatChannel {
    pub is_connected: bool,
    pub sent: Stat,
    pub rcvd: Stat,
    pub bad: Stat,
    pub address: String,
    /// Devices currently attached to the channel.
    pub devices: Vec<String>,
}

/// Snapshot of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatDevice {
    pub is_active: bool,
    pub is_registered: bool,
    /// Registration progress in percent.
    pub reg_state: u8,
    pub cmds_in_queue: usize,
    pub cmds_processed: usize,
    pub sent: Stat,
    pub rcvd: Stat,
    pub bad: Stat,
    pub device: String,
}

impl Default for StatDevice {
    fn default() -> Self {
        Self {
            is_active: false,
            is_registered: false,
            reg_state: 100,
            cmds_in_queue: 0,
            cmds_processed: 0,
            sent: Stat::default(),
            rcvd: Stat::default(),
            bad: Stat::default(),
            device: String::new(),
        }
    }
}
