// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MAVLink v1 over an asynchronous channel.
//!
//! ```text
//! +------+-----+-----+-------+--------+-------+-------------+--------+
//! | 0xFE | len | seq | sysid | compid | msgid | payload     | crc16  |
//! +------+-----+-----+-------+--------+-------+-------------+--------+
//!    1      1     1      1       1        1      len          2 (LE)
//! ```
//!
//! The checksum is CRC-16/MCRF4XX (X.25) over `len..payload` followed by the
//! message's CRC-extra byte. The system id addresses the device.

use std::io;
use std::sync::Arc;

use mavlink::common::MavMessage;
use mavlink::{MavlinkVersion, Message as _};
use mcc_bus::messages::{Cmd, CmdId, CmdStatus, ProtocolId, TmParam, TmParamList, Value};
use mcc_bus::{names, MessageSender, RecvTimeoutError};

use super::Protocol;
use crate::channel_manager::ExchangeMode;
use crate::config::EncoderConfig;
use crate::device::{Device, DeviceCore};
use crate::error::ExchangeError;
use crate::packet::{Coder, PacketDetails, PacketSearcher};
use crate::task::{DeviceTask, TaskCommand, TaskContext, TaskHandle, TASK_IDLE};

pub const PROTOCOL_NAME: &str = "Mavlink";

pub const START_BYTE: u8 = 0xFE;
const HEADER_LEN: usize = 6;
const MAX_PAYLOAD: usize = 255;
/// Header plus checksum.
const MIN_FRAME: usize = HEADER_LEN + 2;

/// Ground station identity used for outgoing frames.
pub const GCS_SYSTEM_ID: u8 = 255;
pub const GCS_COMPONENT_ID: u8 = 190;

const MSG_HEARTBEAT: u8 = 0;
const MAV_TYPE_GCS: u8 = 6;
const MAV_AUTOPILOT_INVALID: u8 = 8;
const MAVLINK_VERSION: u8 = 3;

/// Largest v1 payload and CRC-extra of a common-dialect message.
///
/// v1 senders omit extension fields, so any payload up to the full encoded
/// length is accepted.
fn message_info(msgid: u8) -> Option<(usize, u8)> {
    let id = u32::from(msgid);
    let message = MavMessage::default_message_from_id(id).ok()?;
    let mut buf = [0u8; MAX_PAYLOAD];
    let max_len = message.ser(MavlinkVersion::V1, &mut buf);
    Some((max_len, MavMessage::extra_crc(id)))
}

fn length_fits(len: usize, max_len: usize) -> bool {
    len > 0 && len <= max_len
}

/// CRC-16/MCRF4XX accumulation of `bytes` onto `crc`.
pub fn crc_accumulate(mut crc: u16, bytes: &[u8]) -> u16 {
    for &b in bytes {
        let mut tmp = b ^ (crc & 0xFF) as u8;
        tmp ^= tmp << 4;
        let tmp = tmp as u16;
        crc = (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4);
    }
    crc
}

fn frame_crc(header_and_payload: &[u8], extra: u8) -> u16 {
    let crc = crc_accumulate(0xFFFF, header_and_payload);
    crc_accumulate(crc, &[extra])
}

/// One MAVLink v1 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavlinkFrame {
    pub seq: u8,
    pub sysid: u8,
    pub compid: u8,
    pub msgid: u8,
    pub payload: Vec<u8>,
}

pub struct MavlinkCoder;

impl Coder for MavlinkCoder {
    type Request = MavlinkFrame;
    type Response = MavlinkFrame;

    fn encode_packet(frame: &MavlinkFrame) -> Result<Vec<u8>, ExchangeError> {
        let (max_len, extra) =
            message_info(frame.msgid).ok_or(ExchangeError::EncodeUnknownCommand)?;
        if frame.payload.is_empty() {
            return Err(ExchangeError::EncodeEmptyDataNotAllowed);
        }
        let len = frame.payload.len();
        if !length_fits(len, max_len) {
            return Err(ExchangeError::DecodeBadDataLength);
        }

        let mut out = Vec::with_capacity(MIN_FRAME + len);
        out.extend_from_slice(&[
            START_BYTE,
            len as u8,
            frame.seq,
            frame.sysid,
            frame.compid,
            frame.msgid,
        ]);
        out.extend_from_slice(&frame.payload);
        let crc = frame_crc(&out[1..], extra);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(out)
    }

    fn decode_packet(data: &[u8]) -> Result<PacketDetails, ExchangeError> {
        match data.first() {
            None => return Err(ExchangeError::DecodePacketNotEnoughDataForPacket),
            Some(&START_BYTE) => {}
            Some(_) => return Err(ExchangeError::DecodeBadStartSequence),
        }
        if data.len() < MIN_FRAME {
            return Err(ExchangeError::DecodePacketNotEnoughDataForPacket);
        }

        let len = data[1] as usize;
        let (max_len, extra) = message_info(data[5]).ok_or(ExchangeError::DecodeBadDataLength)?;
        if !length_fits(len, max_len) {
            return Err(ExchangeError::DecodeBadDataLength);
        }
        let size = len + MIN_FRAME;
        if data.len() < size {
            return Err(ExchangeError::DecodePacketNotEnoughDataForPacket);
        }

        let crc = frame_crc(&data[1..HEADER_LEN + len], extra);
        if crc.to_le_bytes() != [data[size - 2], data[size - 1]] {
            return Err(ExchangeError::DecodeBadCrc);
        }
        Ok(PacketDetails::new(size, Some(data[3] as usize)))
    }

    fn decode(data: &[u8]) -> Result<MavlinkFrame, ExchangeError> {
        let details = Self::decode_packet(data)?;
        Ok(MavlinkFrame {
            seq: data[2],
            sysid: data[3],
            compid: data[4],
            msgid: data[5],
            payload: data[HEADER_LEN..details.size - 2].to_vec(),
        })
    }
}

fn heartbeat(seq: u8) -> MavlinkFrame {
    // custom_mode (u32), type, autopilot, base_mode, system_status, version
    let mut payload = vec![0u8; 4];
    payload.extend_from_slice(&[MAV_TYPE_GCS, MAV_AUTOPILOT_INVALID, 0, 0, MAVLINK_VERSION]);
    MavlinkFrame {
        seq,
        sysid: GCS_SYSTEM_ID,
        compid: GCS_COMPONENT_ID,
        msgid: MSG_HEARTBEAT,
        payload,
    }
}

/// Forwards inbound frames as telemetry and frames outgoing `send` commands.
#[derive(Default)]
struct Controller {
    seq: u8,
}

impl Controller {
    fn next_seq(&mut self) -> u8 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    fn transmit(&mut self, ctx: &TaskContext, msgid: u8, payload: Vec<u8>) -> Result<(), ExchangeError> {
        let frame = MavlinkFrame {
            seq: self.next_seq(),
            sysid: GCS_SYSTEM_ID,
            compid: GCS_COMPONENT_ID,
            msgid,
            payload,
        };
        let bytes = MavlinkCoder::encode_packet(&frame)?;
        if ctx.pipe().sender.send(bytes) {
            Ok(())
        } else {
            Err(ExchangeError::PacketCantSend)
        }
    }

    fn handle(&mut self, ctx: &TaskContext, command: TaskCommand) {
        let TaskCommand::Push(cmd) = command else {
            return;
        };
        let args = match (cmd.command.as_str(), cmd.params.as_slice()) {
            ("send", [msgid, payload]) => msgid
                .as_u64()
                .and_then(|id| u8::try_from(id).ok())
                .zip(payload.as_bytes()),
            _ => None,
        };
        match args {
            Some((msgid, payload)) => match self.transmit(ctx, msgid, payload.to_vec()) {
                Ok(()) => ctx.report(&cmd, CmdStatus::AcknowledgeReceived),
                Err(e) => ctx.report_failed(&cmd, e.to_string()),
            },
            None => ctx.report_failed(&cmd, "command unknown"),
        }
        ctx.mark_processed();
    }

    fn forward(&self, ctx: &TaskContext, bytes: &[u8]) {
        match MavlinkCoder::decode(bytes) {
            Ok(frame) => {
                ctx.out().send(TmParamList {
                    device: ctx.device().to_string(),
                    params: vec![TmParam {
                        trait_: PROTOCOL_NAME.to_string(),
                        status: format!("msg_{}", frame.msgid),
                        value: Value::Bytes(frame.payload),
                    }],
                });
            }
            Err(e) => log::debug!("[{}] dropped inbound frame: {}", ctx.name(), e),
        }
    }
}

impl DeviceTask for Controller {
    fn prepare(&mut self, ctx: &TaskContext) -> bool {
        let hb = heartbeat(self.next_seq());
        match MavlinkCoder::encode_packet(&hb) {
            Ok(bytes) => {
                ctx.pipe().sender.send(bytes);
            }
            Err(e) => log::warn!("[{}] heartbeat not encoded: {}", ctx.name(), e),
        }
        true
    }

    fn tick(&mut self, ctx: &TaskContext) {
        while let Some(command) = ctx.try_command() {
            self.handle(ctx, command);
        }
        match ctx.pipe().receiver.recv_timeout(TASK_IDLE) {
            Ok(bytes) => self.forward(ctx, &bytes),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Closed) => std::thread::sleep(TASK_IDLE),
        }
    }
}

pub struct MavlinkDevice {
    core: DeviceCore,
}

impl Device for MavlinkDevice {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn push_cmd(&self, cmd: Cmd) {
        if let Some(task) = self.core.tasks().first() {
            task.push(cmd);
        }
    }

    fn cancel_cmd(&self, cmd_id: CmdId) {
        if let Some(task) = self.core.tasks().first() {
            task.cancel(cmd_id);
        }
    }

    fn async_accept(&self, packet: &[u8]) {
        if self.is_active() {
            self.core.deliver(packet, 0);
        }
    }
}

pub struct MavlinkProtocol {
    tries: usize,
}

impl MavlinkProtocol {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            tries: config.device_tries,
        }
    }
}

impl Protocol for MavlinkProtocol {
    fn name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn service_name(&self) -> &'static str {
        names::ENCODER_MAVLINK
    }

    fn mode(&self) -> ExchangeMode {
        ExchangeMode::Async
    }

    fn searcher(&self) -> PacketSearcher {
        PacketSearcher::for_coder::<MavlinkCoder>()
    }

    fn create_device(
        &self,
        name: &str,
        id: ProtocolId,
        out: MessageSender,
    ) -> io::Result<Arc<dyn Device>> {
        let mut core = DeviceCore::new(name, id, out.clone());
        core.add_task(TaskHandle::spawn(
            &format!("{}.cmd", name),
            name,
            out,
            self.tries,
            Controller::default(),
        )?);
        core.set_registered(true);
        Ok(Arc::new(MavlinkDevice { core }))
    }
}
