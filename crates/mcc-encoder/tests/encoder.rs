// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Encoder services on a live bus, talking to device emulators over loopback TCP.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use mcc_bus::messages::{
    ChannelOperation, ChannelRequest, Cmd, CmdStatus, DeviceActivateRequest,
    DeviceConnectRequest, DeviceListResponse, Error, ProtocolForDeviceResponse, ProtocolId,
    TmParam, TmParamList, Value,
};
use mcc_bus::{
    names, spawn_service, Body, Header, LocalRouter, ManagerConfig, ManagerService, Message,
    MessageQueue, MessageSender, RouterConfig, RouterService, ServiceBase, ServiceConfig,
    TaskRunner,
};
use mcc_encoder::packet::find_packet;
use mcc_encoder::protocol::mavlink::{MavlinkCoder, MavlinkFrame};
use mcc_encoder::protocol::InternalCoder;
use mcc_encoder::{
    Coder, EncoderConfig, EncoderService, InternalProtocol, MavlinkProtocol, Protocol,
    SearchResult,
};

struct Bus {
    service: &'static str,
    ui: MessageSender,
    ui_in: MessageQueue,
    db: MessageSender,
    db_in: MessageQueue,
    cmd_in: MessageQueue,
    tm_in: MessageQueue,
    tasks: Vec<TaskRunner>,
}

impl Bus {
    fn start<P: Protocol>(protocol: P, config: &EncoderConfig) -> Self {
        let service = protocol.service_name();
        let mut router = LocalRouter::new();
        for n in [
            names::CORE_MANAGER,
            names::CORE_DB,
            names::CORE_CMD,
            names::CORE_TM,
            names::UI,
            service,
        ] {
            router.add(n).unwrap();
        }
        let router = Arc::new(router);
        let fast = ServiceConfig { recv_timeout_ms: 10 };

        let mut tasks = vec![TaskRunner::spawn(
            names::CORE_ROUTER,
            RouterService::new(
                router.clone(),
                RouterConfig {
                    recv_timeout_ms: 10,
                    ..RouterConfig::default()
                },
            ),
        )
        .unwrap()];
        let manager = ManagerService::new(
            ServiceBase::new(&router, names::CORE_MANAGER, &fast).unwrap(),
            &ManagerConfig {
                required: vec![service.to_string()],
            },
        );
        tasks.push(spawn_service(manager).unwrap());

        let base = ServiceBase::new(&router, service, &fast).unwrap();
        tasks.push(spawn_service(EncoderService::new(base, protocol, config)).unwrap());

        Self {
            service,
            ui: router.sender(names::UI),
            ui_in: router.receiver(names::UI).unwrap(),
            db: router.sender(names::CORE_DB),
            db_in: router.receiver(names::CORE_DB).unwrap(),
            cmd_in: router.receiver(names::CORE_CMD).unwrap(),
            tm_in: router.receiver(names::CORE_TM).unwrap(),
            tasks,
        }
    }

    fn channel(&self, request: ChannelRequest) -> Option<String> {
        self.ui.send_to(self.service, request);
        wait_for(&self.ui_in, |b| match b {
            Body::ChannelResponse(r) => Some(r.error),
            _ => None,
        })
        .expect("no channel response")
    }

    /// Connect `device` to `channel`, playing the db side of the lookup.
    fn connect(&self, device: &str, channel: &str, protocol: &str, id: u64) -> Option<String> {
        self.ui.send_to(
            self.service,
            DeviceConnectRequest {
                device: device.into(),
                channel: channel.into(),
            },
        );
        let asked = wait_for(&self.db_in, |b| match b {
            Body::ProtocolForDeviceRequest(r) => Some(r.device),
            _ => None,
        });
        assert_eq!(asked.as_deref(), Some(device));
        self.db.send_to(
            self.service,
            ProtocolForDeviceResponse {
                device: device.into(),
                protocols: vec![ProtocolId::new(protocol, id)],
                error: None,
            },
        );
        wait_for(&self.ui_in, |b| match b {
            Body::DeviceConnectResponse(r) => Some(r.error),
            _ => None,
        })
        .expect("no connect response")
    }

    fn activate(&self, device: &str) {
        self.ui.send_to(
            self.service,
            DeviceActivateRequest {
                device: device.into(),
                active: true,
            },
        );
        let error = wait_for(&self.ui_in, |b| match b {
            Body::DeviceActivateResponse(r) => Some(r.error),
            _ => None,
        });
        assert_eq!(error, Some(None));
    }

    fn stop(mut self) {
        // Encoder first so it can release its channels on a live bus.
        while let Some(mut task) = self.tasks.pop() {
            task.finish(true);
        }
    }
}

fn wait_for<T>(queue: &MessageQueue, mut pick: impl FnMut(Body) -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Ok(m) = queue.recv_timeout(Duration::from_millis(20)) {
            if let Some(v) = pick(m.body) {
                return Some(v);
            }
        }
    }
    None
}

fn fast_config() -> EncoderConfig {
    EncoderConfig {
        sync_response_timeout_ms: 200,
        read_pause_ms: 20,
        async_sleep_on_receive_ms: 20,
        ..EncoderConfig::default()
    }
}

/// Feed every complete frame found in the stream to `answer`.
fn serve(
    mut stream: TcpStream,
    find: fn(&[u8]) -> SearchResult,
    mut answer: impl FnMut(&[u8]) -> Option<Vec<u8>>,
) {
    stream
        .set_read_timeout(Some(Duration::from_millis(20)))
        .unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(_) => return,
        }
        loop {
            let found = find(&buf);
            let Some(packet) = found.packet else {
                buf.drain(..found.offset);
                break;
            };
            let frame: Vec<u8> = buf
                .drain(..found.offset + packet.size)
                .skip(found.offset)
                .collect();
            if let Some(reply) = answer(&frame) {
                if stream.write_all(&reply).is_err() {
                    return;
                }
            }
        }
    }
}

/// Internal protocol device: echoes commands, answers telemetry reads,
/// refuses `explode`.
fn internal_device(listener: TcpListener) {
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        serve(stream, find_packet::<InternalCoder>, |frame| {
            let request = InternalCoder::decode(frame).ok()?;
            let header = Header::new(
                0,
                request.header.receiver.clone(),
                request.header.sender.clone(),
                Some(request.header.id),
            );
            let reply = match request.body {
                Body::Cmd(cmd) if cmd.trait_ == "Tm" => Message::new(
                    header,
                    TmParamList {
                        device: cmd.device,
                        params: vec![TmParam {
                            trait_: "Tm".into(),
                            status: "temperature".into(),
                            value: Value::Double(21.5),
                        }],
                    },
                ),
                Body::Cmd(cmd) if cmd.command == "explode" => {
                    Message::new(header, Error::new("refused"))
                }
                body => Message::new(header, body),
            };
            InternalCoder::encode_packet(&reply).ok()
        });
    });
}

fn cmd(id: u32, device: &str, trait_: &str, command: &str, params: Vec<Value>) -> Cmd {
    Cmd {
        cmd_id: id,
        device: device.into(),
        trait_: trait_.into(),
        command: command.into(),
        params,
    }
}

fn final_state(queue: &MessageQueue, cmd_id: u32) -> Option<(CmdStatus, String)> {
    wait_for(queue, |b| match b {
        Body::CmdState(s) if s.cmd_id == cmd_id && s.state.is_terminal() => {
            Some((s.state, s.reason))
        }
        _ => None,
    })
}

#[test]
fn test_internal_device_commands_and_telemetry() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    internal_device(listener);

    let config = fast_config();
    let bus = Bus::start(InternalProtocol::new(&config), &config);

    // Startup asks the db for known devices.
    assert!(wait_for(&bus.db_in, |b| matches!(b, Body::DeviceListRequest(_)).then_some(())).is_some());
    bus.db.send_to(
        bus.service,
        DeviceListResponse {
            devices: vec!["pump".into()],
        },
    );
    let described = wait_for(&bus.db_in, |b| match b {
        Body::DeviceDescriptionRequest(r) => Some(r.device),
        _ => None,
    });
    assert_eq!(described.as_deref(), Some("pump"));

    let settings = format!("Internal:tcp:127.0.0.1:{}", port);
    assert_eq!(bus.channel(ChannelRequest::create("c1", settings.as_str())), None);
    assert_eq!(
        bus.channel(ChannelRequest::with_operation(ChannelOperation::Open, "c1")),
        None
    );
    assert_eq!(bus.connect("pump", "c1", "Internal", 4), None);
    assert!(wait_for(&bus.cmd_in, |b| match b {
        Body::CmdSubscribeRequest(s) => Some(s.on && s.device == "pump"),
        _ => None,
    })
    .unwrap_or(false));
    bus.activate("pump");

    bus.ui
        .send_to(bus.service, cmd(1, "pump", "Motor", "start", vec![Value::UInt(3)]));
    assert_eq!(
        final_state(&bus.cmd_in, 1),
        Some((CmdStatus::AcknowledgeReceived, String::new()))
    );

    bus.ui
        .send_to(bus.service, cmd(2, "pump", "Motor", "explode", vec![]));
    assert_eq!(
        final_state(&bus.cmd_in, 2),
        Some((CmdStatus::Failed, "refused".to_string()))
    );

    bus.ui.send_to(
        bus.service,
        cmd(3, "pump", "Tm", "startReading", vec![Value::Text("Tm".into())]),
    );
    assert_eq!(
        final_state(&bus.cmd_in, 3),
        Some((CmdStatus::AcknowledgeReceived, String::new()))
    );
    let tm = wait_for(&bus.tm_in, |b| match b {
        Body::TmParamList(l) => Some(l),
        _ => None,
    })
    .expect("no telemetry");
    assert_eq!(tm.device, "pump");
    assert_eq!(tm.params[0].status, "temperature");

    bus.stop();
}

#[test]
fn test_open_fails_without_peer() {
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let config = fast_config();
    let bus = Bus::start(InternalProtocol::new(&config), &config);

    let settings = format!("Internal:tcp:127.0.0.1:{}", port);
    assert_eq!(bus.channel(ChannelRequest::create("c1", settings.as_str())), None);
    let error = bus
        .channel(ChannelRequest::with_operation(ChannelOperation::Open, "c1"))
        .expect("open must fail");
    assert!(error.starts_with("cant connect"), "{}", error);

    assert_eq!(
        bus.channel(ChannelRequest::with_operation(ChannelOperation::Remove, "c1")),
        None
    );
    // Gone after the worker exits: a second create is accepted again.
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        match bus.channel(ChannelRequest::create("c1", settings.as_str())) {
            None => break,
            Some(e) => {
                assert_eq!(e, "channel already exists");
                assert!(Instant::now() < deadline, "channel never reaped");
                thread::sleep(Duration::from_millis(20));
            }
        }
    }
    bus.stop();
}

#[test]
fn test_mavlink_frames_become_telemetry() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        // A vehicle with system id 7 beating every 20 ms; noise in between.
        for seq in 0..250u8 {
            let frame = MavlinkFrame {
                seq,
                sysid: 7,
                compid: 1,
                msgid: 0,
                payload: vec![0, 0, 0, 0, 2, 3, 0x51, 4, 3],
            };
            let Ok(bytes) = MavlinkCoder::encode_packet(&frame) else {
                return;
            };
            if stream.write_all(&[0x00, 0x13]).is_err() || stream.write_all(&bytes).is_err() {
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
    });

    let config = fast_config();
    let bus = Bus::start(MavlinkProtocol::new(&config), &config);
    let settings = format!("Mavlink:tcp:127.0.0.1:{}", port);
    assert_eq!(bus.channel(ChannelRequest::create("link", settings.as_str())), None);
    assert_eq!(
        bus.channel(ChannelRequest::with_operation(ChannelOperation::Open, "link")),
        None
    );
    assert_eq!(bus.connect("uav", "link", "Mavlink", 7), None);
    bus.activate("uav");

    let tm = wait_for(&bus.tm_in, |b| match b {
        Body::TmParamList(l) => Some(l),
        _ => None,
    })
    .expect("no telemetry");
    assert_eq!(tm.device, "uav");
    assert_eq!(tm.params[0].trait_, "Mavlink");
    assert_eq!(tm.params[0].status, "msg_0");
    assert_eq!(
        tm.params[0].value,
        Value::Bytes(vec![0, 0, 0, 0, 2, 3, 0x51, 4, 3])
    );

    bus.stop();
}
