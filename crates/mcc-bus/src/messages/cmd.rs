// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Command payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type CmdId = u32;

/// Opaque command parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Human-readable rendering used in logs and command names.
    pub fn stringify(&self) -> String {
        match self {
            Value::Bool(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::UInt(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Text(v) => v.clone(),
            Value::Bytes(v) => v.iter().map(|b| format!("{:02x}", b)).collect(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify())
    }
}

/// Process-scoped command id source, shared by whoever creates commands.
#[derive(Debug, Clone, Default)]
pub struct CmdIdGen {
    next: Arc<AtomicU32>,
}

impl CmdIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> CmdId {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// A command addressed to `device.trait.command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cmd {
    pub cmd_id: CmdId,
    pub device: String,
    #[serde(rename = "trait")]
    pub trait_: String,
    pub command: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Cmd {
    pub fn new(
        ids: &CmdIdGen,
        device: impl Into<String>,
        trait_: impl Into<String>,
        command: impl Into<String>,
        params: Vec<Value>,
    ) -> Self {
        Self {
            cmd_id: ids.next_id(),
            device: device.into(),
            trait_: trait_.into(),
            command: command.into(),
            params,
        }
    }

    /// Dotted name, e.g. `drone1.Tm.readOnce`.
    pub fn name(&self) -> String {
        format!("{}.{}.{}", self.device, self.trait_, self.command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdCancel {
    pub device: String,
    pub cmd_id: CmdId,
}

/// Command lifecycle. Ordered; `AcknowledgeReceived` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CmdStatus {
    Created,
    Registered,
    RoutedForDelivery,
    WaitingInDeliveryQueue,
    SentToDevice,
    AcknowledgeReceived,
    Failed,
}

impl CmdStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CmdStatus::AcknowledgeReceived | CmdStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CmdStatus::Created => "created",
            CmdStatus::Registered => "registered",
            CmdStatus::RoutedForDelivery => "routed for delivery",
            CmdStatus::WaitingInDeliveryQueue => "waiting in delivery queue",
            CmdStatus::SentToDevice => "sent to device",
            CmdStatus::AcknowledgeReceived => "acknowledge received",
            CmdStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CmdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress report for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdState {
    pub cmd_id: CmdId,
    pub device: String,
    pub state: CmdStatus,
    #[serde(default)]
    pub reason: String,
}

impl CmdState {
    pub fn new(cmd: &Cmd, state: CmdStatus) -> Self {
        Self::with_reason(cmd, state, String::new())
    }

    pub fn with_reason(cmd: &Cmd, state: CmdStatus, reason: impl Into<String>) -> Self {
        Self {
            cmd_id: cmd.cmd_id,
            device: cmd.device.clone(),
            state,
            reason: reason.into(),
        }
    }
}

/// Ask the command dispatcher to start or stop routing commands for a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdSubscribeRequest {
    pub on: bool,
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdSubscribeResponse {
    pub on: bool,
    pub device: String,
    #[serde(default)]
    pub error: Option<String>,
}
