// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Physical channel control payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::stats::StatChannel;

/// Channel control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelOperation {
    Create,
    Remove,
    Open,
    Close,
}

impl fmt::Display for ChannelOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelOperation::Create => "create",
            ChannelOperation::Remove => "remove",
            ChannelOperation::Open => "open",
            ChannelOperation::Close => "close",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub operation: ChannelOperation,
    pub address: String,
    /// Settings string, only meaningful for `Create`.
    #[serde(default)]
    pub settings: Option<String>,
}

impl ChannelRequest {
    pub fn create(address: impl Into<String>, settings: impl Into<String>) -> Self {
        Self {
            operation: ChannelOperation::Create,
            address: address.into(),
            settings: Some(settings.into()),
        }
    }

    pub fn with_operation(operation: ChannelOperation, address: impl Into<String>) -> Self {
        Self {
            operation,
            address: address.into(),
            settings: None,
        }
    }
}

/// Outcome of a [`ChannelRequest`]; `error` is `None` on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub operation: ChannelOperation,
    pub address: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl ChannelResponse {
    pub fn ok(request: &ChannelRequest) -> Self {
        Self {
            operation: request.operation,
            address: request.address.clone(),
            error: None,
        }
    }

    pub fn failed(request: &ChannelRequest, error: impl Into<String>) -> Self {
        Self {
            operation: request.operation,
            address: request.address.clone(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStateResponse {
    pub channels: Vec<StatChannel>,
}
