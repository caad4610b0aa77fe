// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Physical links: TCP, UDP and serial.

mod serial;
mod tcp;
mod udp;

#[cfg(test)]
pub(crate) mod scripted;

pub use serial::SerialChannel;
pub use tcp::TcpChannel;
pub use udp::UdpChannel;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::settings::{NetChannel, Transport};

// ---------------------------------------------------------------------------
// Channel trait
// ---------------------------------------------------------------------------

/// One physical connection, driven by a single channel manager thread.
pub trait PhysicalChannel: Send {
    /// `transport:params` of the link.
    fn name(&self) -> &str;

    fn connect(&mut self) -> io::Result<()>;

    fn disconnect(&mut self);

    fn is_open(&self) -> bool;

    /// Write all of `data`.
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Append whatever arrives within `timeout` to `buf`.
    ///
    /// Returns the number of appended bytes, 0 on timeout.
    fn receive(&mut self, buf: &mut Vec<u8>, timeout: Duration) -> io::Result<usize>;

    /// Drop pending inbound bytes.
    fn clear(&mut self);
}

/// Builds a physical channel from parsed settings. `None` if unsupported.
pub type ChannelFactory =
    Arc<dyn Fn(&NetChannel) -> Option<Box<dyn PhysicalChannel>> + Send + Sync>;

/// Build the channel for `settings`. Nothing is connected yet.
pub fn make_channel(settings: &NetChannel) -> Option<Box<dyn PhysicalChannel>> {
    let name = settings.name();
    let channel: Box<dyn PhysicalChannel> = match &settings.transport {
        Transport::Tcp(p) => Box::new(TcpChannel::new(name, p.clone())),
        Transport::Udp(p) => Box::new(UdpChannel::new(name, p.clone())),
        Transport::Com(p) => Box::new(SerialChannel::new(name, p.clone())),
    };
    Some(channel)
}

/// Factory backed by [`make_channel`].
pub fn default_factory() -> ChannelFactory {
    Arc::new(make_channel)
}

pub(crate) fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel is not open")
}

/// Read timeouts of zero are rejected by the socket API.
pub(crate) fn read_timeout(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}

pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
