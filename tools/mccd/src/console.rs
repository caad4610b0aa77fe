// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoints played by the daemon itself.
//!
//! - [`Console`] sits on `mcc.ui`: once the system is up it creates the
//!   preset channels and reports what the encoders answered.
//! - [`Monitor`] drains an endpoint whose real service lives elsewhere and
//!   traces what reached it.

use std::time::Duration;

use mcc_bus::messages::{
    ChannelOperation, ChannelRequest, ChannelResponse, DeviceActionLog, Error, SystemState,
};
use mcc_bus::{
    dispatch, Header, MessageProcessor, MessageQueue, MessageSender, RecvTimeoutError, Runnable,
    TaskControl,
};

use crate::config::{ChannelPreset, ConfigError};

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// A channel request to send once the system is started.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetRequest {
    pub encoder: &'static str,
    pub request: ChannelRequest,
}

/// Create (and open) requests for `presets`, in order.
pub fn preset_requests(presets: &[ChannelPreset]) -> Result<Vec<PresetRequest>, ConfigError> {
    let mut out = Vec::new();
    for preset in presets {
        let encoder = preset.encoder()?.endpoint();
        out.push(PresetRequest {
            encoder,
            request: ChannelRequest::create(preset.address.as_str(), preset.settings.as_str()),
        });
        if preset.open {
            out.push(PresetRequest {
                encoder,
                request: ChannelRequest::with_operation(
                    ChannelOperation::Open,
                    preset.address.as_str(),
                ),
            });
        }
    }
    Ok(out)
}

pub struct Console {
    input: MessageQueue,
    out: MessageSender,
    presets: Vec<PresetRequest>,
    started: bool,
}

impl Console {
    pub fn new(input: MessageQueue, out: MessageSender, presets: Vec<PresetRequest>) -> Self {
        Self {
            input,
            out,
            presets,
            started: false,
        }
    }
}

impl MessageProcessor for Console {
    fn on_system_state(&mut self, _header: Header, body: SystemState) {
        if !body.started {
            tracing::warn!(reason = %body.reason, "system stopped");
            self.started = false;
            return;
        }
        if self.started {
            return;
        }
        self.started = true;
        tracing::info!("system started");
        // First start only.
        for preset in self.presets.drain(..) {
            tracing::info!(
                encoder = preset.encoder,
                address = %preset.request.address,
                operation = %preset.request.operation,
                "preset channel request"
            );
            self.out.send_to(preset.encoder, preset.request);
        }
    }

    fn on_channel_response(&mut self, header: Header, body: ChannelResponse) {
        match &body.error {
            None => tracing::info!(
                encoder = %header.sender,
                address = %body.address,
                operation = %body.operation,
                "channel request done"
            ),
            Some(error) => tracing::warn!(
                encoder = %header.sender,
                address = %body.address,
                operation = %body.operation,
                %error,
                "channel request failed"
            ),
        }
    }

    fn on_device_action_log(&mut self, _header: Header, body: DeviceActionLog) {
        tracing::info!(
            kind = %body.kind,
            name = %body.name,
            details = %body.details,
            "{}",
            body.action
        );
    }

    fn on_error(&mut self, header: Header, body: Error) {
        tracing::warn!(from = %header.sender, "{}", body.error);
    }
}

impl Runnable for Console {
    fn tick(&mut self, _ctl: &TaskControl) {
        match self.input.recv_timeout(RECV_TIMEOUT) {
            Ok(msg) => dispatch(self, msg),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Closed) => std::thread::sleep(RECV_TIMEOUT),
        }
    }
}

/// Traces and drops everything sent to one endpoint.
pub struct Monitor {
    name: String,
    input: MessageQueue,
    seen: u64,
}

impl Monitor {
    pub fn new(name: &str, input: MessageQueue) -> Self {
        Self {
            name: name.to_string(),
            input,
            seen: 0,
        }
    }
}

impl Runnable for Monitor {
    fn tick(&mut self, _ctl: &TaskControl) {
        match self.input.recv_timeout(RECV_TIMEOUT) {
            Ok(msg) => {
                self.seen += 1;
                tracing::debug!(
                    endpoint = %self.name,
                    from = %msg.header.sender,
                    kind = msg.kind(),
                    "message"
                );
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Closed) => std::thread::sleep(RECV_TIMEOUT),
        }
    }

    fn shutdown(&mut self, _ctl: &TaskControl) {
        tracing::debug!(endpoint = %self.name, messages = self.seen, "monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcc_bus::{names, Body, Message};
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    fn presets() -> Vec<ChannelPreset> {
        vec![
            ChannelPreset {
                address: "uav".into(),
                settings: "Mavlink:tcp:127.0.0.1:5760".into(),
                open: true,
            },
            ChannelPreset {
                address: "bench".into(),
                settings: "Internal:com:/dev/ttyS0:9600".into(),
                open: false,
            },
        ]
    }

    #[test]
    fn test_preset_requests_order() {
        let requests = preset_requests(&presets()).unwrap();
        let summary: Vec<(&str, ChannelOperation, &str)> = requests
            .iter()
            .map(|r| (r.encoder, r.request.operation, r.request.address.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (names::ENCODER_MAVLINK, ChannelOperation::Create, "uav"),
                (names::ENCODER_MAVLINK, ChannelOperation::Open, "uav"),
                (names::ENCODER_INTERNAL, ChannelOperation::Create, "bench"),
            ]
        );
        assert_eq!(
            requests[0].request.settings.as_deref(),
            Some("Mavlink:tcp:127.0.0.1:5760")
        );
    }

    #[test]
    fn test_presets_sent_once_after_start() {
        let outbox = MessageQueue::new();
        let out = MessageSender::new(names::UI, outbox.clone(), Arc::new(AtomicU64::new(0)));
        let mut console = Console::new(
            MessageQueue::new(),
            out,
            preset_requests(&presets()).unwrap(),
        );
        let state = |started| {
            Message::new(
                Header::new(1, names::CORE_MANAGER, names::MULTICAST, None),
                SystemState {
                    started,
                    reason: String::new(),
                },
            )
        };

        dispatch(&mut console, state(false));
        assert!(outbox.try_recv().is_err());

        dispatch(&mut console, state(true));
        dispatch(&mut console, state(true));
        let mut sent = Vec::new();
        while let Ok(m) = outbox.try_recv() {
            assert!(matches!(m.body, Body::ChannelRequest(_)));
            sent.push(m.header.receiver);
        }
        assert_eq!(
            sent,
            vec![
                names::ENCODER_MAVLINK.to_string(),
                names::ENCODER_MAVLINK.to_string(),
                names::ENCODER_INTERNAL.to_string(),
            ]
        );
    }
}
