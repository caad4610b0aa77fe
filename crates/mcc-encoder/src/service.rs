// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol encoder service.
//!
//! One bus endpoint per protocol. It owns the channel managers created for
//! that protocol and the known devices, routes commands to device tasks and
//! answers channel and device requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use mcc_bus::messages::{
    ChannelOperation, ChannelRequest, ChannelResponse, ChannelStateResponse, Cmd, CmdCancel,
    CmdState, CmdStatus, CmdSubscribeRequest, DeviceActivateRequest, DeviceActivateResponse,
    DeviceConnectRequest, DeviceConnectResponse, DeviceDescriptionRequest,
    DeviceDescriptionResponse, DeviceDisconnectRequest, DeviceDisconnectResponse,
    DeviceFileLoadCancelRequest, DeviceFileLoadRequest, DeviceFileLoadResponse, DeviceListRequest,
    DeviceListResponse, DeviceStateResponse, DeviceUnRegistered, Header, ProtocolForDeviceRequest,
    ProtocolForDeviceResponse, SystemComponentStateRequest,
};
use mcc_bus::{Envelope, MessageProcessor, MessageSender, ServiceBase, ServiceHandler};

use crate::channel_manager::{ChannelManager, ManagerTimings};
use crate::config::EncoderConfig;
use crate::device::Device;
use crate::exchanger::Exchanger;
use crate::protocol::Protocol;
use crate::settings::NetChannel;
use crate::transport::{default_factory, ChannelFactory};

pub struct EncoderService<P> {
    base: ServiceBase,
    protocol: P,
    timings: ManagerTimings,
    factory: ChannelFactory,
    channels: BTreeMap<String, ChannelManager>,
    devices: BTreeMap<String, Arc<dyn Device>>,
    /// Connect requests waiting for the device's protocol id.
    pending: BTreeMap<String, Envelope<DeviceConnectRequest>>,
}

impl<P: Protocol> EncoderService<P> {
    pub fn new(base: ServiceBase, protocol: P, config: &EncoderConfig) -> Self {
        Self {
            base,
            protocol,
            timings: ManagerTimings::from(config),
            factory: default_factory(),
            channels: BTreeMap::new(),
            devices: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Replace the physical channel factory.
    pub fn with_factory(mut self, factory: ChannelFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    fn out(&self) -> &MessageSender {
        self.base.out()
    }

    fn create_channel(&mut self, header: Header, request: ChannelRequest) {
        let settings = request.settings.clone().unwrap_or_default();
        let parsed: NetChannel = match settings.parse() {
            Ok(p) => p,
            Err(e) => {
                log::debug!("[{}] bad settings '{}': {}", self.base.name(), settings, e);
                self.out().respond(
                    &header,
                    ChannelResponse::failed(
                        &request,
                        format!("invalid channel settings {}", settings),
                    ),
                );
                return;
            }
        };
        if !parsed.protocol.eq_ignore_ascii_case(self.protocol.name()) {
            let error = format!(
                "protocol service incorrect: {} instead of {}",
                parsed.protocol,
                self.protocol.name()
            );
            self.out()
                .respond(&header, ChannelResponse::failed(&request, error));
            return;
        }
        if self.channels.contains_key(&request.address) {
            self.out().respond(
                &header,
                ChannelResponse::failed(&request, "channel already exists"),
            );
            return;
        }

        let mut exchanger = Exchanger::new(parsed, self.protocol.searcher(), self.factory.clone());
        if let Some(opener) = self.protocol.opener() {
            exchanger = exchanger.with_opener(opener);
        }
        let address = request.address.clone();
        let reply_header = header.clone();
        let reply_request = request.clone();
        match ChannelManager::spawn(
            Envelope::new(header, request),
            exchanger,
            self.protocol.mode(),
            self.timings,
            self.out().clone(),
        ) {
            Ok(manager) => {
                log::info!("[{}] channel {} spawned", self.base.name(), address);
                self.channels.insert(address, manager);
            }
            Err(e) => {
                self.out().respond(
                    &reply_header,
                    ChannelResponse::failed(&reply_request, format!("cant create channel: {}", e)),
                );
            }
        }
    }

    fn attach(&self, header: &Header, request: &DeviceConnectRequest, device: &Arc<dyn Device>) {
        let error = match self.channels.get(&request.channel) {
            Some(channel) => {
                channel.add_device(device.clone());
                self.out().send(CmdSubscribeRequest {
                    on: true,
                    device: request.device.clone(),
                });
                None
            }
            None => Some("channel not found".to_string()),
        };
        self.out()
            .respond(header, DeviceConnectResponse::new(request, error));
    }

    fn forget_device(&mut self, name: &str) {
        for channel in self.channels.values() {
            channel.remove_device(name);
        }
        if self.devices.remove(name).is_some() {
            log::debug!("[{}] device {} forgotten", self.base.name(), name);
        }
    }

    /// Drop channel managers whose worker exited.
    fn reap_channels(&mut self) {
        let name = self.base.name().to_string();
        self.channels.retain(|address, manager| {
            if !manager.is_finished() {
                return true;
            }
            manager.finish();
            log::debug!("[{}] channel {} removed", name, address);
            false
        });
    }
}

impl<P: Protocol> MessageProcessor for EncoderService<P> {
    fn on_cmd(&mut self, _header: Header, cmd: Cmd) {
        let Some(device) = self.devices.get(&cmd.device) else {
            self.out()
                .send(CmdState::with_reason(&cmd, CmdStatus::Failed, "unknown device"));
            return;
        };
        if !device.is_active() {
            self.out().send(CmdState::with_reason(
                &cmd,
                CmdStatus::Failed,
                "device is not active",
            ));
            return;
        }
        self.out()
            .send(CmdState::new(&cmd, CmdStatus::RoutedForDelivery));
        device.push_cmd(cmd);
    }

    fn on_cmd_cancel(&mut self, _header: Header, body: CmdCancel) {
        if let Some(device) = self.devices.get(&body.device) {
            device.cancel_cmd(body.cmd_id);
        }
    }

    fn on_system_component_state_request(
        &mut self,
        header: Header,
        _body: SystemComponentStateRequest,
    ) {
        let channels = self.channels.values().map(ChannelManager::stats).collect();
        self.out()
            .respond(&header, ChannelStateResponse { channels });

        let devices = self
            .devices
            .values()
            .filter(|d| self.channels.values().any(|c| c.has_device(d.name())))
            .map(|d| d.stats())
            .collect();
        self.out()
            .respond(&header, DeviceStateResponse { devices });
    }

    fn on_channel_request(&mut self, header: Header, request: ChannelRequest) {
        if request.operation == ChannelOperation::Create {
            self.create_channel(header, request);
            return;
        }
        match self.channels.get(&request.address) {
            Some(channel) => channel.request(header, request),
            None if request.operation == ChannelOperation::Open => {
                self.out().respond(
                    &header,
                    ChannelResponse::failed(&request, "create channel first"),
                );
            }
            None => {
                self.out()
                    .respond(&header, ChannelResponse::ok(&request));
            }
        }
    }

    fn on_device_activate_request(&mut self, header: Header, request: DeviceActivateRequest) {
        let error = match self.devices.get(&request.device) {
            Some(device) => {
                device.activate(request.active);
                None
            }
            None => Some("unknown device".to_string()),
        };
        self.out()
            .respond(&header, DeviceActivateResponse::new(&request, error));
    }

    fn on_device_connect_request(&mut self, header: Header, request: DeviceConnectRequest) {
        if !self.channels.contains_key(&request.channel) {
            let error = format!("open connection first for channel {}", request.channel);
            self.out()
                .respond(&header, DeviceConnectResponse::new(&request, Some(error)));
            return;
        }
        if let Some(device) = self.devices.get(&request.device) {
            self.attach(&header, &request, device);
            return;
        }
        let device = request.device.clone();
        match self.pending.insert(device.clone(), Envelope::new(header, request)) {
            Some(old) => {
                let error = "superseded by a newer connect request".to_string();
                self.out()
                    .respond(&old.header, DeviceConnectResponse::new(&old.body, Some(error)));
            }
            None => {
                self.out().send(ProtocolForDeviceRequest { device });
            }
        }
    }

    fn on_device_disconnect_request(&mut self, header: Header, request: DeviceDisconnectRequest) {
        let Some(channel) = self.channels.get(&request.channel) else {
            self.out().respond(
                &header,
                DeviceDisconnectResponse::new(&request, Some("connection not found".into())),
            );
            return;
        };
        channel.remove_device(&request.device);

        let error = match self.devices.get(&request.device) {
            None => Some("unknown device".to_string()),
            Some(device) => {
                self.out().send(CmdSubscribeRequest {
                    on: false,
                    device: request.device.clone(),
                });
                if !device.is_registered() {
                    self.devices.remove(&request.device);
                }
                None
            }
        };
        self.out()
            .respond(&header, DeviceDisconnectResponse::new(&request, error));
    }

    fn on_device_list_response(&mut self, _header: Header, body: DeviceListResponse) {
        for device in body.devices {
            self.out().send(DeviceDescriptionRequest { device });
        }
    }

    fn on_device_description_response(&mut self, _header: Header, _body: DeviceDescriptionResponse) {}

    fn on_device_file_load_request(&mut self, header: Header, request: DeviceFileLoadRequest) {
        let error = match self.devices.get(&request.device) {
            Some(device) => device.file_load(&request),
            None => Some("unknown device".to_string()),
        };
        self.out()
            .respond(&header, DeviceFileLoadResponse::new(&request, error));
    }

    fn on_device_file_load_cancel_request(
        &mut self,
        header: Header,
        request: DeviceFileLoadCancelRequest,
    ) {
        let error = match self.devices.get(&request.device) {
            Some(device) => device.file_load_cancel(&request),
            None => Some("unknown device".to_string()),
        };
        self.out()
            .respond(&header, DeviceFileLoadResponse::cancelled(&request, error));
    }

    fn on_protocol_for_device_response(&mut self, _header: Header, body: ProtocolForDeviceResponse) {
        let protocol = self.protocol.name();
        let id = body
            .protocols
            .iter()
            .find(|p| p.protocol.eq_ignore_ascii_case(protocol))
            .cloned();

        let Some(id) = id else {
            match self.pending.remove(&body.device) {
                Some(pending) => {
                    let error = format!(
                        "Protocol {} id for device {} is not set",
                        protocol, body.device
                    );
                    self.out().respond(
                        &pending.header,
                        DeviceConnectResponse::new(&pending.body, Some(error)),
                    );
                }
                None => self.forget_device(&body.device),
            }
            return;
        };

        let Some(pending) = self.pending.remove(&body.device) else {
            return;
        };
        if !self.devices.contains_key(&body.device) {
            match self
                .protocol
                .create_device(&body.device, id, self.out().clone())
            {
                Ok(device) => {
                    log::info!("[{}] device {} created", self.base.name(), body.device);
                    self.devices.insert(body.device.clone(), device);
                }
                Err(e) => {
                    let error = format!("cant create device: {}", e);
                    self.out().respond(
                        &pending.header,
                        DeviceConnectResponse::new(&pending.body, Some(error)),
                    );
                    return;
                }
            }
        }
        if let Some(device) = self.devices.get(&body.device) {
            self.attach(&pending.header, &pending.body, device);
        }
    }

    fn on_device_unregistered(&mut self, _header: Header, body: DeviceUnRegistered) {
        self.forget_device(&body.device);
    }
}

impl<P: Protocol> ServiceHandler for EncoderService<P> {
    fn base(&self) -> &ServiceBase {
        &self.base
    }

    fn waits_for_system(&self) -> bool {
        true
    }

    fn on_started(&mut self) -> bool {
        self.out().send(DeviceListRequest);
        true
    }

    fn on_idle(&mut self) {
        self.reap_channels();
    }

    fn on_stop(&mut self) {
        for manager in self.channels.values_mut() {
            manager.finish();
        }
        self.channels.clear();
        self.pending.clear();
        self.devices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::InternalProtocol;
    use crate::transport::scripted::ScriptedLink;
    use mcc_bus::messages::{ProtocolId, Value};
    use mcc_bus::{dispatch, names, Body, Message, MessageQueue};
    use std::sync::atomic::AtomicU64;
    use std::time::{Duration, Instant};

    struct Fixture {
        service: EncoderService<InternalProtocol>,
        outbox: MessageQueue,
        ids: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let outbox = MessageQueue::new();
            let out = MessageSender::new(
                names::ENCODER_INTERNAL,
                outbox.clone(),
                Arc::new(AtomicU64::new(0)),
            );
            let base = ServiceBase::from_parts(
                names::ENCODER_INTERNAL,
                MessageQueue::new(),
                out,
                Duration::from_millis(10),
            );
            let config = EncoderConfig::default();
            let link = ScriptedLink::default();
            let service = EncoderService::new(base, InternalProtocol::new(&config), &config)
                .with_factory(link.factory());
            Self {
                service,
                outbox,
                ids: 0,
            }
        }

        fn deliver(&mut self, body: impl Into<Body>) -> u64 {
            self.ids += 1;
            let header = Header::new(self.ids, names::UI, names::ENCODER_INTERNAL, None);
            dispatch(&mut self.service, Message::new(header, body));
            self.ids
        }

        /// Collect outgoing bodies until `done` holds or 2 s pass.
        fn collect(&self, done: impl Fn(&[Body]) -> bool) -> Vec<Body> {
            let mut got = Vec::new();
            let start = Instant::now();
            while !done(&got) && start.elapsed() < Duration::from_secs(2) {
                if let Ok(m) = self.outbox.recv_timeout(Duration::from_millis(10)) {
                    got.push(m.body);
                }
            }
            got
        }

        fn channel_error(&self) -> Option<String> {
            let got = self.collect(|b| b.iter().any(|b| matches!(b, Body::ChannelResponse(_))));
            got.into_iter()
                .find_map(|b| match b {
                    Body::ChannelResponse(r) => Some(r),
                    _ => None,
                })
                .and_then(|r| r.error)
        }

        fn connect_error(&self) -> Option<String> {
            let got =
                self.collect(|b| b.iter().any(|b| matches!(b, Body::DeviceConnectResponse(_))));
            got.into_iter()
                .find_map(|b| match b {
                    Body::DeviceConnectResponse(r) => Some(r),
                    _ => None,
                })
                .and_then(|r| r.error)
        }
    }

    fn cmd(device: &str) -> Cmd {
        Cmd {
            cmd_id: 11,
            device: device.into(),
            trait_: "Motor".into(),
            command: "start".into(),
            params: vec![Value::Bool(true)],
        }
    }

    fn connect(device: &str, channel: &str) -> DeviceConnectRequest {
        DeviceConnectRequest {
            device: device.into(),
            channel: channel.into(),
        }
    }

    #[test]
    fn test_cmd_for_unknown_device_fails() {
        let mut f = Fixture::new();
        f.deliver(cmd("ghost"));
        let got = f.collect(|b| !b.is_empty());
        match &got[0] {
            Body::CmdState(s) => {
                assert_eq!(s.state, CmdStatus::Failed);
                assert_eq!(s.reason, "unknown device");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_channel_request_validation() {
        let mut f = Fixture::new();

        f.deliver(ChannelRequest::create("c1", "Internal:tcp:nope"));
        assert_eq!(
            f.channel_error().as_deref(),
            Some("invalid channel settings Internal:tcp:nope")
        );

        f.deliver(ChannelRequest::create("c1", "Mavlink:tcp:127.0.0.1:5760"));
        assert_eq!(
            f.channel_error().as_deref(),
            Some("protocol service incorrect: Mavlink instead of Internal")
        );

        f.deliver(ChannelRequest::with_operation(ChannelOperation::Open, "c1"));
        assert_eq!(f.channel_error().as_deref(), Some("create channel first"));

        f.deliver(ChannelRequest::with_operation(ChannelOperation::Close, "c1"));
        assert_eq!(f.channel_error(), None);

        f.deliver(ChannelRequest::create("c1", "Internal:tcp:127.0.0.1:5760"));
        assert_eq!(f.channel_error(), None);
        f.deliver(ChannelRequest::create("c1", "Internal:tcp:127.0.0.1:5760"));
        assert_eq!(f.channel_error().as_deref(), Some("channel already exists"));

        f.service.on_stop();
    }

    #[test]
    fn test_connect_waits_for_protocol_id() {
        let mut f = Fixture::new();
        f.deliver(connect("d1", "c1"));
        assert_eq!(
            f.connect_error().as_deref(),
            Some("open connection first for channel c1")
        );

        f.deliver(ChannelRequest::create("c1", "Internal:tcp:127.0.0.1:5760"));
        assert_eq!(f.channel_error(), None);

        f.deliver(connect("d1", "c1"));
        let got = f.collect(|b| b.iter().any(|b| matches!(b, Body::ProtocolForDeviceRequest(_))));
        assert!(got
            .iter()
            .any(|b| matches!(b, Body::ProtocolForDeviceRequest(r) if r.device == "d1")));

        f.deliver(ProtocolForDeviceResponse {
            device: "d1".into(),
            protocols: vec![ProtocolId::new("Internal", 3)],
            error: None,
        });
        let got = f.collect(|b| b.iter().any(|b| matches!(b, Body::DeviceConnectResponse(_))));
        assert!(got
            .iter()
            .any(|b| matches!(b, Body::CmdSubscribeRequest(s) if s.on && s.device == "d1")));
        assert!(got
            .iter()
            .any(|b| matches!(b, Body::DeviceConnectResponse(r) if r.error.is_none())));

        // Known but inactive.
        f.deliver(cmd("d1"));
        let got = f.collect(|b| b.iter().any(|b| matches!(b, Body::CmdState(_))));
        assert!(got.iter().any(
            |b| matches!(b, Body::CmdState(s) if s.reason == "device is not active")
        ));

        f.deliver(DeviceActivateRequest {
            device: "d1".into(),
            active: true,
        });
        f.deliver(cmd("d1"));
        let got = f.collect(|b| {
            b.iter()
                .any(|b| matches!(b, Body::CmdState(s) if s.state == CmdStatus::RoutedForDelivery))
        });
        assert!(got
            .iter()
            .any(|b| matches!(b, Body::DeviceActivateResponse(r) if r.error.is_none())));

        f.deliver(SystemComponentStateRequest);
        let got = f.collect(|b| b.iter().any(|b| matches!(b, Body::DeviceStateResponse(_))));
        let devices = got
            .into_iter()
            .find_map(|b| match b {
                Body::DeviceStateResponse(r) => Some(r.devices),
                _ => None,
            })
            .unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device, "d1");
        assert!(devices[0].is_active);

        f.deliver(DeviceUnRegistered {
            device: "d1".into(),
        });
        f.deliver(cmd("d1"));
        let got = f.collect(|b| {
            b.iter()
                .any(|b| matches!(b, Body::CmdState(s) if s.reason == "unknown device"))
        });
        assert!(!got.is_empty());

        f.service.on_stop();
    }

    #[test]
    fn test_second_connect_supersedes_pending_one() {
        let mut f = Fixture::new();
        f.deliver(ChannelRequest::create("c1", "Internal:tcp:127.0.0.1:5760"));
        assert_eq!(f.channel_error(), None);
        f.deliver(ChannelRequest::create("c2", "Internal:tcp:127.0.0.1:5761"));
        assert_eq!(f.channel_error(), None);

        f.deliver(connect("d1", "c1"));
        f.deliver(connect("d1", "c2"));
        let got = f.collect(|b| b.iter().any(|b| matches!(b, Body::DeviceConnectResponse(_))));
        let lookups = got
            .iter()
            .filter(|b| matches!(b, Body::ProtocolForDeviceRequest(_)))
            .count();
        assert_eq!(lookups, 1);
        let first = got
            .into_iter()
            .find_map(|b| match b {
                Body::DeviceConnectResponse(r) => Some(r),
                _ => None,
            })
            .unwrap();
        assert_eq!(first.channel, "c1");
        assert_eq!(
            first.error.as_deref(),
            Some("superseded by a newer connect request")
        );

        f.deliver(ProtocolForDeviceResponse {
            device: "d1".into(),
            protocols: vec![ProtocolId::new("Internal", 3)],
            error: None,
        });
        let got = f.collect(|b| b.iter().any(|b| matches!(b, Body::DeviceConnectResponse(_))));
        assert!(got.iter().any(|b| matches!(
            b,
            Body::DeviceConnectResponse(r) if r.channel == "c2" && r.error.is_none()
        )));
        f.service.on_stop();
    }

    #[test]
    fn test_missing_protocol_id_rejects_connect() {
        let mut f = Fixture::new();
        f.deliver(ChannelRequest::create("c1", "Internal:tcp:127.0.0.1:5760"));
        assert_eq!(f.channel_error(), None);

        f.deliver(connect("d9", "c1"));
        f.deliver(ProtocolForDeviceResponse {
            device: "d9".into(),
            protocols: vec![ProtocolId::new("Mavlink", 3)],
            error: None,
        });
        assert_eq!(
            f.connect_error().as_deref(),
            Some("Protocol Internal id for device d9 is not set")
        );
        f.service.on_stop();
    }

    #[test]
    fn test_device_requests_for_unknown_device() {
        let mut f = Fixture::new();
        f.deliver(DeviceActivateRequest {
            device: "x".into(),
            active: true,
        });
        f.deliver(DeviceFileLoadRequest {
            device: "x".into(),
            file_path: "/tmp/f".into(),
            direction: mcc_bus::messages::FileDirection::Down,
        });
        f.deliver(DeviceFileLoadCancelRequest {
            device: "x".into(),
            file_path: "/tmp/f".into(),
            reason: "operator".into(),
        });
        f.deliver(DeviceDisconnectRequest {
            device: "x".into(),
            channel: "c1".into(),
        });
        let got = f.collect(|b| b.len() >= 4);
        let errors: Vec<Option<String>> = got
            .into_iter()
            .map(|b| match b {
                Body::DeviceActivateResponse(r) => r.error,
                Body::DeviceFileLoadResponse(r) => r.error,
                Body::DeviceDisconnectResponse(r) => r.error,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            errors,
            vec![
                Some("unknown device".to_string()),
                Some("unknown device".to_string()),
                Some("unknown device".to_string()),
                Some("connection not found".to_string()),
            ]
        );
    }

    #[test]
    fn test_device_list_asks_descriptions() {
        let mut f = Fixture::new();
        f.deliver(DeviceListResponse {
            devices: vec!["a".into(), "b".into()],
        });
        let got = f.collect(|b| b.len() >= 2);
        let asked: Vec<String> = got
            .into_iter()
            .filter_map(|b| match b {
                Body::DeviceDescriptionRequest(r) => Some(r.device),
                _ => None,
            })
            .collect();
        assert_eq!(asked, vec!["a".to_string(), "b".to_string()]);
    }
}
