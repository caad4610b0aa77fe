// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire protocols served by an encoder service.

pub mod internal;
pub mod mavlink;
pub mod photon;

pub use internal::{InternalCoder, InternalProtocol};
pub use mavlink::{MavlinkCoder, MavlinkProtocol};
pub use photon::{PhotonCoder, PhotonProtocol};

use std::io;
use std::sync::Arc;

use mcc_bus::messages::ProtocolId;
use mcc_bus::MessageSender;

use crate::channel_manager::ExchangeMode;
use crate::device::Device;
use crate::exchanger::Opener;
use crate::packet::PacketSearcher;

/// Everything the generic encoder service needs to know about a protocol.
pub trait Protocol: Send + 'static {
    /// Protocol name as found in settings strings and [`ProtocolId`]s.
    fn name(&self) -> &'static str;

    /// Bus endpoint of the encoder service.
    fn service_name(&self) -> &'static str;

    fn mode(&self) -> ExchangeMode;

    fn searcher(&self) -> PacketSearcher;

    /// Post-connect handshake, if the protocol has one.
    fn opener(&self) -> Option<Opener> {
        None
    }

    /// Build a device and start its tasks. Devices start inactive.
    fn create_device(
        &self,
        name: &str,
        id: ProtocolId,
        out: MessageSender,
    ) -> io::Result<Arc<dyn Device>>;
}
