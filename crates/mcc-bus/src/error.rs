// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use thiserror::Error;

/// Bus wiring errors.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("router is locked, endpoint '{0}' can not be registered")]
    Locked(String),

    #[error("endpoint '{0}' is already registered")]
    Duplicate(String),

    #[error("unknown endpoint '{0}'")]
    UnknownEndpoint(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
