// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Physical connection plus framing buffer.
//!
//! ```text
//!   NoChannel --start--> Created --open--> Opened --close--> Closed
//!       ^                   |                 |                 |
//!       +-------------------+------stop-------+-----------------+
//! ```

use std::time::{Duration, Instant};

use mcc_bus::messages::Stat;

use crate::error::ExchangerError;
use crate::packet::{PacketDetails, PacketSearcher};
use crate::settings::NetChannel;
use crate::transport::{ChannelFactory, PhysicalChannel};

/// Handshake run right after a successful connect. An `Err` closes the
/// channel again and its text is reported to the requester.
pub type Opener = Box<dyn FnMut(&mut dyn PhysicalChannel) -> Result<(), String> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    NoChannel,
    Created,
    Opened,
    Closed,
}

/// Traffic counters of one exchanger.
#[derive(Debug, Clone, Default)]
pub struct ExchangeStats {
    pub sent: Stat,
    pub rcvd: Stat,
    /// Garbage skipped while framing.
    pub bad: Stat,
}

pub struct Exchanger {
    settings: NetChannel,
    factory: ChannelFactory,
    searcher: PacketSearcher,
    opener: Option<Opener>,
    channel: Option<Box<dyn PhysicalChannel>>,
    state: ExchangeState,
    buffer: Vec<u8>,
    stats: ExchangeStats,
}

impl Exchanger {
    pub fn new(settings: NetChannel, searcher: PacketSearcher, factory: ChannelFactory) -> Self {
        Self {
            settings,
            factory,
            searcher,
            opener: None,
            channel: None,
            state: ExchangeState::NoChannel,
            buffer: Vec::new(),
            stats: ExchangeStats::default(),
        }
    }

    pub fn with_opener(mut self, opener: Opener) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn settings(&self) -> &NetChannel {
        &self.settings
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Opened and the link is still up.
    pub fn is_open(&self) -> bool {
        self.state == ExchangeState::Opened && self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    pub fn stats(&self) -> &ExchangeStats {
        &self.stats
    }

    /// Bytes waiting in the framing buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Build the physical channel. Nothing is connected yet.
    pub fn start(&mut self) -> Result<(), ExchangerError> {
        if self.channel.is_some() {
            return Err(ExchangerError::AlreadyCreated);
        }
        let channel = (self.factory)(&self.settings)
            .ok_or_else(|| ExchangerError::CantCreate(self.settings.to_string()))?;
        self.channel = Some(channel);
        self.state = ExchangeState::Created;
        Ok(())
    }

    /// Disconnect and drop the physical channel.
    pub fn stop(&mut self) -> Result<(), ExchangerError> {
        let mut channel = self.channel.take().ok_or(ExchangerError::NotCreated)?;
        channel.disconnect();
        self.buffer.clear();
        self.state = ExchangeState::NoChannel;
        Ok(())
    }

    pub fn open(&mut self) -> Result<(), ExchangerError> {
        let channel = self.channel.as_mut().ok_or(ExchangerError::NotSupported)?;
        channel
            .connect()
            .map_err(|e| ExchangerError::CantConnect(e.to_string()))?;
        self.buffer.clear();
        self.state = ExchangeState::Opened;

        if let Some(opener) = self.opener.as_mut() {
            if let Err(e) = opener(channel.as_mut()) {
                log::debug!("[exchanger] {} opener failed: {}", self.settings.name(), e);
                channel.disconnect();
                self.state = ExchangeState::Closed;
                return Err(ExchangerError::Opener(e));
            }
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), ExchangerError> {
        let channel = self.channel.as_mut().ok_or(ExchangerError::NotCreated)?;
        match self.state {
            ExchangeState::Created => Err(ExchangerError::NotOpened),
            ExchangeState::Closed => Err(ExchangerError::AlreadyClosed),
            _ => {
                channel.disconnect();
                self.buffer.clear();
                self.state = ExchangeState::Closed;
                Ok(())
            }
        }
    }

    /// Write `data` to the link. `false` when not open or the write failed.
    pub fn send_data(&mut self, data: &[u8]) -> bool {
        let Some(channel) = self.channel.as_mut().filter(|_| self.state == ExchangeState::Opened)
        else {
            return false;
        };
        match channel.send(data) {
            Ok(()) => {
                self.stats.sent.add(data.len(), true);
                true
            }
            Err(e) => {
                log::debug!("[exchanger] {} send failed: {}", self.settings.name(), e);
                false
            }
        }
    }

    /// Pull whatever the link delivers within `timeout` into the buffer.
    pub fn receive_data(&mut self, timeout: Duration) -> usize {
        let Some(channel) = self.channel.as_mut().filter(|_| self.state == ExchangeState::Opened)
        else {
            return 0;
        };
        match channel.receive(&mut self.buffer, timeout) {
            Ok(n) => n,
            Err(e) => {
                log::debug!("[exchanger] {} receive failed: {}", self.settings.name(), e);
                if !channel.is_open() {
                    self.state = ExchangeState::Closed;
                }
                0
            }
        }
    }

    /// Move the first complete frame of the buffer into `out`.
    ///
    /// Leading garbage is dropped and accounted as bad bytes. A partial frame
    /// stays in the buffer.
    pub fn get_packet(&mut self, out: &mut Vec<u8>) -> Option<PacketDetails> {
        out.clear();
        let found = self.searcher.search(&self.buffer);
        if found.offset > 0 {
            log::debug!(
                "[exchanger] {} skipped {} garbage bytes",
                self.settings.name(),
                found.offset
            );
            self.stats.bad.add(found.offset, false);
        }
        match found.packet {
            Some(packet) => {
                let end = found.offset + packet.size;
                self.stats.rcvd.add(packet.size, true);
                out.extend_from_slice(&self.buffer[found.offset..end]);
                self.buffer.drain(..end);
                Some(packet)
            }
            None => {
                self.buffer.drain(..found.offset);
                None
            }
        }
    }

    /// Receive until one frame is complete or `timeout` elapses.
    pub fn receive_packet(&mut self, timeout: Duration, out: &mut Vec<u8>) -> Option<PacketDetails> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(packet) = self.get_packet(out) {
                return Some(packet);
            }
            let now = Instant::now();
            if now >= deadline || !self.is_open() {
                return None;
            }
            self.receive_data(deadline - now);
        }
    }

    /// Drop buffered and pending inbound bytes.
    pub fn clear(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            channel.clear();
        }
        self.buffer.clear();
    }
}

impl Drop for Exchanger {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            channel.disconnect();
        }
    }
}
