// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet framing over an accumulating byte buffer.

use std::fmt;
use std::sync::Arc;

use crate::error::ExchangeError;

/// Device identifier embedded in a frame (protocol-specific meaning).
pub type DeviceId = usize;

/// A complete frame found at the start of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketDetails {
    /// Frame length in bytes.
    pub size: usize,
    /// Addressed device, when the protocol carries one.
    pub device_id: Option<DeviceId>,
}

impl PacketDetails {
    pub fn new(size: usize, device_id: Option<DeviceId>) -> Self {
        Self { size, device_id }
    }
}

/// Outcome of one scan.
///
/// With `packet`, the frame starts at `offset`. Without, `offset` leading bytes
/// are garbage and the rest must wait for more data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResult {
    pub offset: usize,
    pub packet: Option<PacketDetails>,
}

/// Wire codec of one protocol.
pub trait Coder: Send + Sync + 'static {
    type Request;
    type Response;

    fn encode_packet(request: &Self::Request) -> Result<Vec<u8>, ExchangeError>;

    /// Inspect the frame starting at `data[0]`.
    ///
    /// Must return `DecodePacketNotEnoughDataForPacket` when `data` is a valid
    /// but truncated frame prefix.
    fn decode_packet(data: &[u8]) -> Result<PacketDetails, ExchangeError>;

    /// Decode a complete frame into a response.
    fn decode(data: &[u8]) -> Result<Self::Response, ExchangeError>;
}

/// Scan `buf` for the first complete frame, skipping garbage one byte at a time.
pub fn find_packet<C: Coder>(buf: &[u8]) -> SearchResult {
    let mut offset = 0;
    while offset < buf.len() {
        match C::decode_packet(&buf[offset..]) {
            Ok(details) => {
                return SearchResult {
                    offset,
                    packet: Some(details),
                }
            }
            Err(ExchangeError::DecodePacketNotEnoughDataForPacket) => {
                return SearchResult {
                    offset,
                    packet: None,
                }
            }
            Err(_) => offset += 1,
        }
    }
    SearchResult {
        offset: buf.len(),
        packet: None,
    }
}

/// `None` when `buf` starts with a valid frame.
pub fn validate_packet<C: Coder>(buf: &[u8]) -> Option<ExchangeError> {
    C::decode_packet(buf).err()
}

/// Type-erased [`find_packet`] for one protocol.
#[derive(Clone)]
pub struct PacketSearcher {
    search: Arc<dyn Fn(&[u8]) -> SearchResult + Send + Sync>,
}

impl PacketSearcher {
    pub fn new<F>(search: F) -> Self
    where
        F: Fn(&[u8]) -> SearchResult + Send + Sync + 'static,
    {
        Self {
            search: Arc::new(search),
        }
    }

    pub fn for_coder<C: Coder>() -> Self {
        Self::new(find_packet::<C>)
    }

    pub fn search(&self, buf: &[u8]) -> SearchResult {
        (self.search)(buf)
    }
}

impl fmt::Debug for PacketSearcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PacketSearcher")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// `0xAA len id payload[len]`
    pub(crate) struct ToyCoder;

    impl Coder for ToyCoder {
        type Request = Vec<u8>;
        type Response = Vec<u8>;

        fn encode_packet(request: &Vec<u8>) -> Result<Vec<u8>, ExchangeError> {
            if request.is_empty() {
                return Err(ExchangeError::EncodeEmptyDataNotAllowed);
            }
            let mut out = vec![0xAA, request.len() as u8, 1];
            out.extend_from_slice(request);
            Ok(out)
        }

        fn decode_packet(data: &[u8]) -> Result<PacketDetails, ExchangeError> {
            match data.first() {
                None => return Err(ExchangeError::DecodePacketNotEnoughDataForPacket),
                Some(0xAA) => {}
                Some(_) => return Err(ExchangeError::DecodeBadStartSequence),
            }
            if data.len() < 3 {
                return Err(ExchangeError::DecodePacketNotEnoughDataForPacket);
            }
            let size = 3 + data[1] as usize;
            if data.len() < size {
                return Err(ExchangeError::DecodePacketNotEnoughDataForPacket);
            }
            Ok(PacketDetails::new(size, Some(data[2] as usize)))
        }

        fn decode(data: &[u8]) -> Result<Vec<u8>, ExchangeError> {
            let d = Self::decode_packet(data)?;
            Ok(data[3..d.size].to_vec())
        }
    }

    #[test]
    fn test_empty_buffer() {
        assert_eq!(
            find_packet::<ToyCoder>(&[]),
            SearchResult {
                offset: 0,
                packet: None
            }
        );
    }

    #[test]
    fn test_partial_packet_keeps_bytes() {
        let r = find_packet::<ToyCoder>(&[0x01, 0x02, 0xAA, 0x05, 0x01, 0x10]);
        assert_eq!(r.offset, 2);
        assert!(r.packet.is_none());
    }

    #[test]
    fn test_all_garbage_is_consumed() {
        let r = find_packet::<ToyCoder>(&[1, 2, 3, 4]);
        assert_eq!(r.offset, 4);
        assert!(r.packet.is_none());
    }

    #[test]
    fn test_extracts_every_packet_between_garbage() {
        let packets: Vec<Vec<u8>> = vec![
            ToyCoder::encode_packet(&vec![1, 2, 3]).unwrap(),
            ToyCoder::encode_packet(&vec![9]).unwrap(),
            ToyCoder::encode_packet(&vec![7, 7, 7, 7, 7]).unwrap(),
        ];
        let garbage: [&[u8]; 4] = [&[0x00, 0x13], &[], &[0x42, 0x42, 0x42], &[0x01]];

        let mut buf = Vec::new();
        for (i, p) in packets.iter().enumerate() {
            buf.extend_from_slice(garbage[i]);
            buf.extend_from_slice(p);
        }
        buf.extend_from_slice(garbage[3]);

        let searcher = PacketSearcher::for_coder::<ToyCoder>();
        let mut found = Vec::new();
        loop {
            let r = searcher.search(&buf);
            match r.packet {
                Some(p) => {
                    found.push(buf[r.offset..r.offset + p.size].to_vec());
                    buf.drain(..r.offset + p.size);
                }
                None => {
                    buf.drain(..r.offset);
                    break;
                }
            }
        }

        assert_eq!(found, packets);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_validate_packet() {
        let p = ToyCoder::encode_packet(&vec![1]).unwrap();
        assert_eq!(validate_packet::<ToyCoder>(&p), None);
        assert_eq!(
            validate_packet::<ToyCoder>(&[0x55]),
            Some(ExchangeError::DecodeBadStartSequence)
        );
    }
}
