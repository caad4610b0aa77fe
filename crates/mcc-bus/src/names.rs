// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Well-known endpoint names.

/// Receiver meaning "every registered endpoint except the sender".
pub const MULTICAST: &str = "~";

pub const CORE_DB: &str = "mcc.core.db";
pub const CORE_CMD: &str = "mcc.core.cmd";
pub const CORE_TM: &str = "mcc.core.tm";
pub const CORE_MANAGER: &str = "mcc.core.manager";
pub const CORE_ROUTER: &str = "mcc.core.router";

pub const UI: &str = "mcc.ui";

pub const ENCODER_INTERNAL: &str = "mcc.encoder.internal";
pub const ENCODER_MAVLINK: &str = "mcc.encoder.mavlink";
pub const ENCODER_PHOTON: &str = "mcc.encoder.photon";

/// `true` for the multicast sentinel.
pub fn is_multicast(name: &str) -> bool {
    name == MULTICAST
}
