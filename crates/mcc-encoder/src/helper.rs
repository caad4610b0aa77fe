// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/reply with bounded retries over a device task's byte pipe.

use mcc_bus::ChannelPair;

use crate::error::ExchangeError;
use crate::packet::{validate_packet, Coder};

/// Task side of the pipe between a device task and its channel manager.
pub type BytePipe = ChannelPair<Vec<u8>, Vec<u8>>;

/// Sends a request and waits for the reply, retrying transient failures.
///
/// An empty reply means the channel manager gave up waiting; it counts as a
/// `DecodePacketNotEnoughDataForPacket` and is retried.
#[derive(Clone)]
pub struct ExchangeHelper {
    pipe: BytePipe,
    tries: usize,
}

impl ExchangeHelper {
    /// # Panics
    ///
    /// Panics if `tries` is 0.
    pub fn new(pipe: BytePipe, tries: usize) -> Self {
        assert!(tries > 0, "exchange helper needs at least one try");
        Self { pipe, tries }
    }

    pub fn tries(&self) -> usize {
        self.tries
    }

    pub fn pipe(&self) -> &BytePipe {
        &self.pipe
    }

    /// Encode `request`, exchange it and decode the reply.
    pub fn request_reply<C: Coder>(&self, request: &C::Request) -> Result<C::Response, ExchangeError> {
        let bytes = C::encode_packet(request)?;
        self.exchange(&bytes, C::decode)
    }

    /// Exchange pre-encoded bytes; the reply is only checked for framing.
    pub fn request_reply_raw<C: Coder>(&self, request: &[u8]) -> Result<Vec<u8>, ExchangeError> {
        self.exchange(request, |reply| match validate_packet::<C>(reply) {
            None => Ok(reply.to_vec()),
            Some(e) => Err(e),
        })
    }

    fn exchange<T, F>(&self, request: &[u8], decode: F) -> Result<T, ExchangeError>
    where
        F: Fn(&[u8]) -> Result<T, ExchangeError>,
    {
        if request.is_empty() {
            return Err(ExchangeError::PacketCantSendEmpty);
        }

        let mut last = ExchangeError::DecodePacketNotEnoughDataForPacket;
        for attempt in 1..=self.tries {
            if !self.pipe.sender.send(request.to_vec()) {
                return Err(ExchangeError::PacketCantSend);
            }
            let Some(reply) = self.pipe.receiver.recv_blocking() else {
                return Err(ExchangeError::PacketCantReceive);
            };

            let result = if reply.is_empty() {
                Err(ExchangeError::DecodePacketNotEnoughDataForPacket)
            } else {
                decode(&reply)
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_resend_impossible() => return Err(e),
                Err(e) => {
                    log::debug!("[exchange] attempt {}/{} failed: {}", attempt, self.tries, e);
                    last = e;
                }
            }
        }
        Err(last)
    }
}
