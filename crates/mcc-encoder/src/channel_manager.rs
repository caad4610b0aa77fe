// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection worker.
//!
//! A [`ChannelManager`] owns one [`Exchanger`] and the devices sharing it.
//! The encoder service hands it control requests and device list changes;
//! its worker thread applies them and runs one exchange pass per tick:
//!
//! ```text
//! tick: apply request / device changes (under lock)
//!       idle wait on condvar   (channel closed, or no devices)
//!       sync or async pass
//!       copy exchanger stats
//! ```

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use mcc_bus::messages::{
    ChannelOperation, ChannelRequest, ChannelResponse, DeviceActionLog, Header, StatChannel,
};
use mcc_bus::{Envelope, MessageSender, Runnable, TaskControl, TaskRunner, Wakeup};

use crate::config::EncoderConfig;
use crate::device::Device;
use crate::exchanger::Exchanger;

/// How a protocol talks over a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeMode {
    /// One request, one reply, device by device.
    Sync,
    /// Send everything pending, then route whatever arrives.
    Async,
}

/// Exchange timings taken from [`EncoderConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ManagerTimings {
    pub sync_response_timeout: Duration,
    pub sync_no_exchange_pause: Duration,
    pub async_sleep_on_receive: Duration,
}

impl From<&EncoderConfig> for ManagerTimings {
    fn from(config: &EncoderConfig) -> Self {
        Self {
            sync_response_timeout: config.sync_response_timeout(),
            sync_no_exchange_pause: config.sync_no_exchange_pause(),
            async_sleep_on_receive: config.async_sleep_on_receive(),
        }
    }
}

struct State {
    request: Option<Envelope<ChannelRequest>>,
    devices: Vec<Arc<dyn Device>>,
    devices_changed: bool,
    stats: StatChannel,
}

struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

impl Shared {
    fn notify(&self) {
        // Taking the lock orders the notification after a waiter's check.
        let _guard = self.state.lock();
        self.changed.notify_all();
    }
}

impl Wakeup for Shared {
    fn wake(&self) {
        self.notify();
    }
}

/// Service-side handle of a channel worker.
pub struct ChannelManager {
    address: String,
    out: MessageSender,
    shared: Arc<Shared>,
    runner: TaskRunner,
}

impl ChannelManager {
    /// Spawn the worker. `create` is executed first thing on the worker
    /// thread and answered like any later request.
    pub fn spawn(
        create: Envelope<ChannelRequest>,
        exchanger: Exchanger,
        mode: ExchangeMode,
        timings: ManagerTimings,
        out: MessageSender,
    ) -> io::Result<Self> {
        let address = create.body.address.clone();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                request: None,
                devices: Vec::new(),
                devices_changed: false,
                stats: StatChannel {
                    address: address.clone(),
                    ..StatChannel::default()
                },
            }),
            changed: Condvar::new(),
        });

        let worker = ChannelWorker {
            address: address.clone(),
            shared: shared.clone(),
            initial: Some(create),
            exchanger,
            mode,
            timings,
            out: out.clone(),
            devices: Vec::new(),
        };
        let runner = TaskRunner::spawn(&format!("channel:{}", address), worker)?;

        Ok(Self {
            address,
            out,
            shared,
            runner,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Queue a control request. A request still pending is replaced.
    pub fn request(&self, header: Header, request: ChannelRequest) {
        let mut state = self.shared.state.lock();
        self.queue_request(&mut state, Envelope::new(header, request));
        self.shared.changed.notify_all();
    }

    /// The replaced request is answered as failed.
    fn queue_request(&self, state: &mut State, request: Envelope<ChannelRequest>) {
        let Some(old) = state.request.replace(request) else {
            return;
        };
        log::warn!(
            "[channel] {} request '{}' replaced before execution",
            self.address,
            old.body.operation
        );
        self.out.respond(
            &old.header,
            ChannelResponse::failed(&old.body, "request replaced by a newer one"),
        );
    }

    /// Attach `device`. `false` if a device with that name is attached already.
    pub fn add_device(&self, device: Arc<dyn Device>) -> bool {
        let mut state = self.shared.state.lock();
        if state.devices.iter().any(|d| d.name() == device.name()) {
            return false;
        }
        log::info!("[channel] {} device {} connected", self.address, device.name());
        self.out.send(DeviceActionLog::new(
            "device",
            device.name(),
            "connected",
            self.address.as_str(),
        ));
        state.devices.push(device);
        state.devices_changed = true;
        self.shared.changed.notify_all();
        true
    }

    /// Detach the device named `name`. `false` if it was not attached.
    pub fn remove_device(&self, name: &str) -> bool {
        let mut state = self.shared.state.lock();
        let before = state.devices.len();
        state.devices.retain(|d| d.name() != name);
        if state.devices.len() == before {
            return false;
        }
        log::info!("[channel] {} device {} disconnected", self.address, name);
        self.out.send(DeviceActionLog::new(
            "device",
            name,
            "disconnected",
            self.address.as_str(),
        ));
        state.devices_changed = true;
        self.shared.changed.notify_all();
        true
    }

    pub fn has_device(&self, name: &str) -> bool {
        self.shared.state.lock().devices.iter().any(|d| d.name() == name)
    }

    pub fn stats(&self) -> StatChannel {
        self.shared.state.lock().stats.clone()
    }

    /// `true` once the worker exited (after `Remove`).
    pub fn is_finished(&self) -> bool {
        self.runner.is_finished()
    }

    pub fn finish(&mut self) -> bool {
        self.runner.finish(true)
    }
}

struct ChannelWorker {
    address: String,
    shared: Arc<Shared>,
    initial: Option<Envelope<ChannelRequest>>,
    exchanger: Exchanger,
    mode: ExchangeMode,
    timings: ManagerTimings,
    out: MessageSender,
    /// Snapshot of the attached devices, refreshed at the top of each tick.
    devices: Vec<Arc<dyn Device>>,
}

impl ChannelWorker {
    fn execute_request(&mut self, request: Envelope<ChannelRequest>, ctl: &TaskControl) {
        let Envelope { header, body } = request;
        let (result, action) = match body.operation {
            ChannelOperation::Create => (self.exchanger.start(), "created"),
            ChannelOperation::Open => (self.exchanger.open(), "opened"),
            ChannelOperation::Close => (self.exchanger.close(), "closed"),
            ChannelOperation::Remove => {
                ctl.request_stop();
                (self.exchanger.stop(), "removed")
            }
        };
        self.shared.state.lock().stats.is_connected = self.exchanger.is_open();

        match result {
            Ok(()) => {
                log::info!("[channel] {} {}", self.address, action);
                self.out.respond(&header, ChannelResponse::ok(&body));
                self.out.send(DeviceActionLog::new(
                    "channel",
                    self.address.as_str(),
                    action,
                    self.exchanger.settings().to_string(),
                ));
            }
            Err(e) => {
                log::warn!(
                    "[channel] {} {} failed: {}",
                    self.address,
                    body.operation,
                    e
                );
                self.out
                    .respond(&header, ChannelResponse::failed(&body, e.to_string()));
            }
        }
    }

    /// Take the pending request and refresh the device snapshot.
    fn apply_changes(&mut self) -> Option<Envelope<ChannelRequest>> {
        let mut state = self.shared.state.lock();
        if state.devices_changed {
            self.devices = state.devices.clone();
            state.stats.devices = self.devices.iter().map(|d| d.name().to_string()).collect();
            state.devices_changed = false;
        }
        state.request.take()
    }

    fn wait_for_work(&self, ctl: &TaskControl) {
        let mut state = self.shared.state.lock();
        loop {
            if !ctl.is_running() || state.request.is_some() || state.devices_changed {
                return;
            }
            if self.exchanger.is_open() && !self.devices.is_empty() {
                return;
            }
            self.shared.changed.wait(&mut state);
        }
    }

    fn sync_pass(&mut self, ctl: &TaskControl) {
        let mut out = Vec::new();
        let mut reply = Vec::new();
        let mut exchanged = false;

        for device in &self.devices {
            if !ctl.is_running() {
                break;
            }
            let Some(client) = device.request(&mut out) else {
                continue;
            };
            if out.is_empty() {
                continue;
            }
            exchanged = true;

            self.exchanger.clear();
            reply.clear();
            if self.exchanger.send_data(&out) {
                self.exchanger
                    .receive_packet(self.timings.sync_response_timeout, &mut reply);
            }
            device.sync_accept(&reply, client);
        }

        if !exchanged {
            thread::sleep(self.timings.sync_no_exchange_pause);
        }
    }

    fn async_pass(&mut self) {
        let mut out = Vec::new();
        for device in &self.devices {
            if device.request(&mut out).is_some() && !out.is_empty() {
                self.exchanger.send_data(&out);
            }
        }

        self.exchanger
            .receive_data(self.timings.async_sleep_on_receive);

        let mut packet = Vec::new();
        while let Some(details) = self.exchanger.get_packet(&mut packet) {
            match details.device_id {
                None => {
                    for device in &self.devices {
                        device.async_accept(&packet);
                    }
                }
                Some(id) => match self.devices.iter().find(|d| d.is_same(id)) {
                    Some(device) => device.async_accept(&packet),
                    None => log::debug!(
                        "[channel] {} frame for unknown device id {}",
                        self.address,
                        id
                    ),
                },
            }
        }
    }

    fn refresh_stats(&self) {
        let stats = self.exchanger.stats();
        let mut state = self.shared.state.lock();
        state.stats.is_connected = self.exchanger.is_open();
        state.stats.sent = stats.sent.clone();
        state.stats.rcvd = stats.rcvd.clone();
        state.stats.bad = stats.bad.clone();
    }
}

impl Runnable for ChannelWorker {
    fn prepare(&mut self, ctl: &TaskControl) -> bool {
        if let Some(create) = self.initial.take() {
            self.execute_request(create, ctl);
        }
        true
    }

    fn tick(&mut self, ctl: &TaskControl) {
        if let Some(request) = self.apply_changes() {
            self.execute_request(request, ctl);
        }
        if !ctl.is_running() {
            return;
        }

        self.wait_for_work(ctl);
        if !ctl.is_running() || !self.exchanger.is_open() {
            self.refresh_stats();
            return;
        }

        match self.mode {
            ExchangeMode::Sync => self.sync_pass(ctl),
            ExchangeMode::Async => self.async_pass(),
        }
        self.refresh_stats();
    }

    fn shutdown(&mut self, _ctl: &TaskControl) {
        // Already stopped by Remove otherwise.
        let _ = self.exchanger.stop();
        self.shared.state.lock().stats.is_connected = false;
        log::debug!("[channel] {} worker stopped", self.address);
    }

    fn wakeup(&self) -> Option<Arc<dyn Wakeup>> {
        Some(self.shared.clone())
    }
}
