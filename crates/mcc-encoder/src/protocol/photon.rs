// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Photon protocol. Framing is not available; devices can be attached but
//! every command fails.

use std::io;
use std::sync::Arc;

use mcc_bus::messages::{Cmd, CmdId, ProtocolId};
use mcc_bus::{names, MessageSender};

use super::Protocol;
use crate::channel_manager::ExchangeMode;
use crate::config::EncoderConfig;
use crate::device::{Device, DeviceCore};
use crate::error::ExchangeError;
use crate::packet::{Coder, PacketDetails, PacketSearcher};
use crate::task::{DeviceTask, TaskCommand, TaskContext, TaskHandle, TASK_IDLE};

pub const PROTOCOL_NAME: &str = "Photon";

pub struct PhotonCoder;

impl Coder for PhotonCoder {
    type Request = Vec<u8>;
    type Response = Vec<u8>;

    fn encode_packet(_request: &Vec<u8>) -> Result<Vec<u8>, ExchangeError> {
        Err(ExchangeError::EncodeNotImplemented)
    }

    fn decode_packet(_data: &[u8]) -> Result<PacketDetails, ExchangeError> {
        Err(ExchangeError::DecodeNotImplemented)
    }

    fn decode(_data: &[u8]) -> Result<Vec<u8>, ExchangeError> {
        Err(ExchangeError::DecodeNotImplemented)
    }
}

struct Commander;

impl DeviceTask for Commander {
    fn tick(&mut self, ctx: &TaskContext) {
        if let Some(TaskCommand::Push(cmd)) = ctx.next_command(TASK_IDLE) {
            ctx.report_failed(&cmd, ExchangeError::EncodeNotImplemented.to_string());
            ctx.mark_processed();
        }
    }
}

pub struct PhotonDevice {
    core: DeviceCore,
}

impl Device for PhotonDevice {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn push_cmd(&self, cmd: Cmd) {
        if let Some(task) = self.core.tasks().first() {
            task.push(cmd);
        }
    }

    fn cancel_cmd(&self, _cmd_id: CmdId) {}
}

pub struct PhotonProtocol {
    tries: usize,
}

impl PhotonProtocol {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            tries: config.device_tries,
        }
    }
}

impl Protocol for PhotonProtocol {
    fn name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn service_name(&self) -> &'static str {
        names::ENCODER_PHOTON
    }

    fn mode(&self) -> ExchangeMode {
        ExchangeMode::Async
    }

    fn searcher(&self) -> PacketSearcher {
        PacketSearcher::for_coder::<PhotonCoder>()
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
            Commander,
        )?);
        Ok(Arc::new(PhotonDevice { core }))
    }
}
