// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Exchange error taxonomy.

use thiserror::Error;

/// Framing, encoding, transport and device-reported failures.
///
/// Each kind is statically classified by [`ExchangeError::is_resend_impossible`]:
/// resending the same request can only help for transient kinds (timeouts,
/// corrupted frames).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ExchangeError {
    #[error("send: empty packet can not be sent")]
    PacketCantSendEmpty,
    #[error("send: packet can not be sent to the device")]
    PacketCantSend,
    #[error("decode: not enough data for a packet")]
    DecodePacketNotEnoughDataForPacket,
    #[error("receive: packet can not be received from the device")]
    PacketCantReceive,
    #[error("encode: not implemented")]
    EncodeNotImplemented,
    #[error("encode: empty data not allowed")]
    EncodeEmptyDataNotAllowed,
    #[error("decode: not implemented")]
    DecodeNotImplemented,
    #[error("decode: bad data length")]
    DecodeBadDataLength,
    #[error("decode: unexpected answer type")]
    DecodeBadAnswer,
    #[error("encode: unknown command")]
    EncodeUnknownCommand,
    #[error("decode: bad checksum")]
    DecodeBadCrc,
    #[error("decode: bad start sequence")]
    DecodeBadStartSequence,
    #[error("device: wrong command")]
    DeviceWrongCmd,
    #[error("device: invalid node number")]
    DeviceInvalidNodeNum,
    #[error("device: invalid node id")]
    DeviceInvalidNodeId,
    #[error("device: invalid variable number")]
    DeviceInvalidVarNum,
    #[error("device: invalid variable value")]
    DeviceInvalidVarVal,
    #[error("device: other error")]
    DeviceOther,
    #[error("device: unknown error")]
    DeviceUnknownError,
    #[error("decode: device error can not be decoded")]
    DecodeCantDecodeDeviceError,
}

impl ExchangeError {
    /// `true` when resending the unchanged request can not succeed.
    pub fn is_resend_impossible(self) -> bool {
        matches!(
            self,
            ExchangeError::PacketCantSendEmpty
                | ExchangeError::EncodeNotImplemented
                | ExchangeError::EncodeUnknownCommand
                | ExchangeError::EncodeEmptyDataNotAllowed
                | ExchangeError::DecodeNotImplemented
                | ExchangeError::DecodeCantDecodeDeviceError
                | ExchangeError::DeviceWrongCmd
                | ExchangeError::DeviceInvalidNodeNum
                | ExchangeError::DeviceInvalidNodeId
                | ExchangeError::DeviceInvalidVarNum
                | ExchangeError::DeviceInvalidVarVal
                | ExchangeError::DeviceOther
                | ExchangeError::DeviceUnknownError
                | ExchangeError::DecodeBadDataLength
        )
    }
}

/// Exchanger lifecycle failures. The `Display` text travels in
/// `Channel_Response.error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangerError {
    #[error("channel already created")]
    AlreadyCreated,
    #[error("cant create channel: {0}")]
    CantCreate(String),
    #[error("channel is not created yet")]
    NotCreated,
    #[error("channel is not opened yet")]
    NotOpened,
    #[error("channel already closed")]
    AlreadyClosed,
    #[error("connection type not supported")]
    NotSupported,
    #[error("cant connect: {0}")]
    CantConnect(String),
    #[error("{0}")]
    Opener(String),
}
