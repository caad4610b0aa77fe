// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Internal protocol: bus messages over a framed byte stream.
//!
//! ```text
//! +------+------+-----------+-----------------+-----+
//! | 0xA5 | 0x5A | len (u32) | message (json)  | xor |
//! +------+------+-----------+-----------------+-----+
//! ```
//!
//! Request/reply, one exchange at a time. Each device runs a command task
//! and a telemetry reader.

use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use mcc_bus::messages::{Cmd, CmdId, CmdIdGen, CmdStatus, Header, ProtocolId};
use mcc_bus::{names, Body, Message, MessageSender};

use super::Protocol;
use crate::channel_manager::ExchangeMode;
use crate::config::EncoderConfig;
use crate::device::{Device, DeviceCore};
use crate::error::ExchangeError;
use crate::packet::{Coder, PacketDetails, PacketSearcher};
use crate::task::{DeviceTask, TaskCommand, TaskContext, TaskHandle, TASK_IDLE};

pub const PROTOCOL_NAME: &str = "Internal";

const MAGIC: [u8; 2] = [0xA5, 0x5A];
const HEADER_LEN: usize = 6;
const MAX_PAYLOAD: usize = 1 << 20;

/// Trait whose commands go to the telemetry reader.
const TM_TRAIT: &str = "Tm";

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

pub struct InternalCoder;

impl Coder for InternalCoder {
    type Request = Message;
    type Response = Message;

    fn encode_packet(request: &Message) -> Result<Vec<u8>, ExchangeError> {
        let payload = request
            .serialize()
            .map_err(|_| ExchangeError::EncodeUnknownCommand)?;
        if payload.len() > MAX_PAYLOAD {
            return Err(ExchangeError::EncodeUnknownCommand);
        }
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + 1);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&payload);
        out.push(checksum(&payload));
        Ok(out)
    }

    fn decode_packet(data: &[u8]) -> Result<PacketDetails, ExchangeError> {
        for (i, m) in MAGIC.iter().enumerate() {
            match data.get(i) {
                None => return Err(ExchangeError::DecodePacketNotEnoughDataForPacket),
                Some(b) if b != m => return Err(ExchangeError::DecodeBadStartSequence),
                Some(_) => {}
            }
        }
        if data.len() < HEADER_LEN {
            return Err(ExchangeError::DecodePacketNotEnoughDataForPacket);
        }
        let len = u32::from_le_bytes([data[2], data[3], data[4], data[5]]) as usize;
        if len > MAX_PAYLOAD {
            return Err(ExchangeError::DecodeBadDataLength);
        }
        let size = HEADER_LEN + len + 1;
        if data.len() < size {
            return Err(ExchangeError::DecodePacketNotEnoughDataForPacket);
        }
        if checksum(&data[HEADER_LEN..size - 1]) != data[size - 1] {
            return Err(ExchangeError::DecodeBadCrc);
        }
        Ok(PacketDetails::new(size, None))
    }

    fn decode(data: &[u8]) -> Result<Message, ExchangeError> {
        let details = Self::decode_packet(data)?;
        Message::deserialize(&data[HEADER_LEN..details.size - 1])
            .map_err(|_| ExchangeError::DecodeBadAnswer)
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

fn wrap(ctx: &TaskContext, cmd: Cmd) -> Message {
    Message::new(Header::new(0, ctx.name(), ctx.device(), None), cmd)
}

/// Queues commands and sends them one by one.
#[derive(Default)]
struct Commander {
    queue: VecDeque<Cmd>,
}

impl Commander {
    fn handle(&mut self, ctx: &TaskContext, command: TaskCommand) {
        match command {
            TaskCommand::Push(cmd) => {
                if self.queue.iter().any(|c| c.cmd_id == cmd.cmd_id) {
                    log::warn!("[{}] duplicate cmd id {}", ctx.name(), cmd.cmd_id);
                    ctx.report_failed(&cmd, "duplicate command id");
                    return;
                }
                ctx.report(&cmd, CmdStatus::WaitingInDeliveryQueue);
                self.queue.push_back(cmd);
            }
            TaskCommand::Cancel(cmd_id) => {
                if let Some(pos) = self.queue.iter().position(|c| c.cmd_id == cmd_id) {
                    if let Some(cmd) = self.queue.remove(pos) {
                        ctx.report_failed(&cmd, "canceled by user");
                    }
                }
            }
            TaskCommand::Wake => {}
        }
        ctx.set_in_queue(self.queue.len());
    }

    fn execute(&self, ctx: &TaskContext, cmd: Cmd) {
        ctx.report(&cmd, CmdStatus::SentToDevice);
        match ctx.helper().request_reply::<InternalCoder>(&wrap(ctx, cmd.clone())) {
            Ok(Message {
                body: Body::Error(e),
                ..
            }) => ctx.report_failed(&cmd, e.error),
            Ok(_) => ctx.report(&cmd, CmdStatus::AcknowledgeReceived),
            Err(e) => ctx.report_failed(&cmd, e.to_string()),
        }
        ctx.mark_processed();
    }
}

impl DeviceTask for Commander {
    fn tick(&mut self, ctx: &TaskContext) {
        while let Some(command) = ctx.try_command() {
            self.handle(ctx, command);
        }
        if !ctx.is_active() || self.queue.is_empty() {
            if let Some(command) = ctx.next_command(TASK_IDLE) {
                self.handle(ctx, command);
            }
            return;
        }
        if let Some(cmd) = self.queue.pop_front() {
            ctx.set_in_queue(self.queue.len());
            self.execute(ctx, cmd);
        }
    }
}

/// Polls telemetry while at least one trait is subscribed.
struct Reader {
    traits: BTreeSet<String>,
    pause: Duration,
    ids: CmdIdGen,
}

impl Reader {
    fn new(pause: Duration, ids: CmdIdGen) -> Self {
        Self {
            traits: BTreeSet::new(),
            pause,
            ids,
        }
    }

    fn handle(&mut self, ctx: &TaskContext, command: TaskCommand) {
        let TaskCommand::Push(cmd) = command else {
            return;
        };
        let target = cmd.params.first().map(|p| p.stringify());
        match (cmd.command.as_str(), target) {
            ("startReading", Some(t)) => {
                log::debug!("[{}] reading {}", ctx.name(), t);
                self.traits.insert(t);
                ctx.report(&cmd, CmdStatus::AcknowledgeReceived);
            }
            ("stopReading", Some(t)) => {
                self.traits.remove(&t);
                ctx.report(&cmd, CmdStatus::AcknowledgeReceived);
            }
            _ => ctx.report_failed(&cmd, "command unknown"),
        }
        ctx.mark_processed();
    }

    fn read_once(&mut self, ctx: &TaskContext) {
        let cmd = Cmd::new(&self.ids, ctx.device(), TM_TRAIT, "readOnce", Vec::new());
        match ctx.helper().request_reply::<InternalCoder>(&wrap(ctx, cmd)) {
            Ok(reply) => {
                ctx.out().send_to(names::CORE_TM, reply.body);
            }
            Err(e) => log::debug!("[{}] readOnce failed: {}", ctx.name(), e),
        }
    }
}

impl DeviceTask for Reader {
    fn tick(&mut self, ctx: &TaskContext) {
        while let Some(command) = ctx.try_command() {
            self.handle(ctx, command);
        }
        if !ctx.is_active() || self.traits.is_empty() {
            if let Some(command) = ctx.next_command(TASK_IDLE) {
                self.handle(ctx, command);
            }
            return;
        }
        self.read_once(ctx);
        if let Some(command) = ctx.next_command(self.pause) {
            self.handle(ctx, command);
        }
    }
}

// ---------------------------------------------------------------------------
// Device and protocol
// ---------------------------------------------------------------------------

pub struct InternalDevice {
    core: DeviceCore,
}

impl InternalDevice {
    fn reader(&self) -> Option<&TaskHandle> {
        self.core.tasks().first()
    }

    fn commander(&self) -> Option<&TaskHandle> {
        self.core.tasks().get(1)
    }
}

impl Device for InternalDevice {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn push_cmd(&self, cmd: Cmd) {
        let task = if cmd.trait_ == TM_TRAIT {
            self.reader()
        } else {
            self.commander()
        };
        if let Some(task) = task {
            task.push(cmd);
        }
    }

    fn cancel_cmd(&self, cmd_id: CmdId) {
        if let Some(task) = self.commander() {
            task.cancel(cmd_id);
        }
    }
}

pub struct InternalProtocol {
    tries: usize,
    read_pause: Duration,
    ids: CmdIdGen,
}

impl InternalProtocol {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            tries: config.device_tries,
            read_pause: config.read_pause(),
            ids: CmdIdGen::new(),
        }
    }

    /// Number telemetry polls from `ids` instead of a private counter.
    pub fn with_cmd_ids(mut self, ids: CmdIdGen) -> Self {
        self.ids = ids;
        self
    }
}

impl Protocol for InternalProtocol {
    fn name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn service_name(&self) -> &'static str {
        names::ENCODER_INTERNAL
    }

    fn mode(&self) -> ExchangeMode {
        ExchangeMode::Sync
    }

    fn searcher(&self) -> PacketSearcher {
        PacketSearcher::for_coder::<InternalCoder>()
    }

    fn create_device(
        &self,
        name: &str,
        id: ProtocolId,
        out: MessageSender,
    ) -> io::Result<Arc<dyn Device>> {
        let mut core = DeviceCore::new(name, id, out.clone());
        core.add_task(TaskHandle::spawn(
            &format!("{}.read", name),
            name,
            out.clone(),
            self.tries,
            Reader::new(self.read_pause, self.ids.clone()),
        )?);
        core.add_task(TaskHandle::spawn(
            &format!("{}.cmd", name),
            name,
            out,
            self.tries,
            Commander::default(),
        )?);
        core.set_registered(true);
        Ok(Arc::new(InternalDevice { core }))
    }
}
