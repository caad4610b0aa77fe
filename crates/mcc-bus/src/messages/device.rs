// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device, protocol and telemetry payloads.

use serde::{Deserialize, Serialize};

use super::cmd::Value;
use super::stats::StatDevice;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceActivateRequest {
    pub device: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceActivateResponse {
    pub device: String,
    pub active: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl DeviceActivateResponse {
    pub fn new(request: &DeviceActivateRequest, error: Option<String>) -> Self {
        Self {
            device: request.device.clone(),
            active: request.active,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConnectRequest {
    pub device: String,
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConnectResponse {
    pub device: String,
    pub channel: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl DeviceConnectResponse {
    pub fn new(request: &DeviceConnectRequest, error: Option<String>) -> Self {
        Self {
            device: request.device.clone(),
            channel: request.channel.clone(),
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDisconnectRequest {
    pub device: String,
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDisconnectResponse {
    pub device: String,
    pub channel: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl DeviceDisconnectResponse {
    pub fn new(request: &DeviceDisconnectRequest, error: Option<String>) -> Self {
        Self {
            device: request.device.clone(),
            channel: request.channel.clone(),
            error,
        }
    }
}

/// Audit record for the persistence service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceActionLog {
    /// `device` or `channel`.
    pub kind: String,
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub details: String,
}

impl DeviceActionLog {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        action: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            action: action.into(),
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateResponse {
    pub devices: Vec<StatDevice>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceListRequest;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceListResponse {
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptionRequest {
    pub device: String,
}

/// Registry record of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptionResponse {
    pub device: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub device_id: u64,
    #[serde(default)]
    pub device_info: String,
    #[serde(default)]
    pub kind_name: String,
    #[serde(default)]
    pub firmware_name: String,
}

/// Broadcast when the registry forgets a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceUnRegistered {
    pub device: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFileLoadRequest {
    pub device: String,
    pub file_path: String,
    pub direction: FileDirection,
}

/// Abort a running transfer. Answered with a [`DeviceFileLoadResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFileLoadCancelRequest {
    pub device: String,
    pub file_path: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFileLoadResponse {
    pub device: String,
    pub file_path: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl DeviceFileLoadResponse {
    pub fn new(request: &DeviceFileLoadRequest, error: Option<String>) -> Self {
        Self {
            device: request.device.clone(),
            file_path: request.file_path.clone(),
            error,
        }
    }

    pub fn cancelled(request: &DeviceFileLoadCancelRequest, error: Option<String>) -> Self {
        Self {
            device: request.device.clone(),
            file_path: request.file_path.clone(),
            error,
        }
    }
}

/// Identifier of a device under one wire protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolId {
    pub protocol: String,
    pub id: u64,
}

impl ProtocolId {
    pub fn new(protocol: impl Into<String>, id: u64) -> Self {
        Self {
            protocol: protocol.into(),
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolForDeviceRequest {
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolForDeviceResponse {
    pub device: String,
    #[serde(default)]
    pub protocols: Vec<ProtocolId>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One telemetry value tagged with the trait it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmParam {
    #[serde(rename = "trait")]
    pub trait_: String,
    pub status: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmParamList {
    pub device: String,
    pub params: Vec<TmParam>,
}
