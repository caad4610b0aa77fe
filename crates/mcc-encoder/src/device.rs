// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Devices attached to channel managers.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use mcc_bus::messages::{
    Cmd, CmdId, DeviceActionLog, DeviceFileLoadCancelRequest, DeviceFileLoadRequest, ProtocolId,
    StatDevice,
};
use mcc_bus::MessageSender;

use crate::packet::DeviceId;
use crate::task::TaskHandle;

/// A remote device as seen by the encoder service and the channel managers.
///
/// Shared between the service thread (commands, activation) and the channel
/// manager thread (exchange), hence `Sync`.
pub trait Device: Send + Sync {
    fn core(&self) -> &DeviceCore;

    /// Route a command to the task that serves its trait.
    fn push_cmd(&self, cmd: Cmd);

    fn cancel_cmd(&self, cmd_id: CmdId);

    /// Start a file transfer. `Some(error)` on refusal.
    fn file_load(&self, request: &DeviceFileLoadRequest) -> Option<String> {
        let _ = request;
        Some("not implemented".to_string())
    }

    /// Abort a file transfer. `Some(error)` on refusal.
    fn file_load_cancel(&self, request: &DeviceFileLoadCancelRequest) -> Option<String> {
        let _ = request;
        Some("not implemented".to_string())
    }

    /// Inbound frame on an asynchronous channel.
    fn async_accept(&self, packet: &[u8]) {
        log::debug!(
            "[{}] async accept of {} bytes not implemented",
            self.name(),
            packet.len()
        );
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn id(&self) -> DeviceId {
        self.core().id()
    }

    /// `true` when a frame carrying `id` belongs to this device.
    fn is_same(&self, id: DeviceId) -> bool {
        self.id() == id
    }

    fn is_active(&self) -> bool {
        self.core().is_active()
    }

    fn is_registered(&self) -> bool {
        self.core().is_registered()
    }

    fn activate(&self, active: bool) {
        self.core().activate(active);
    }

    /// Next outbound request of one of the tasks, see [`DeviceCore::request`].
    fn request(&self, out: &mut Vec<u8>) -> Option<usize> {
        self.core().request(out)
    }

    /// Reply of a synchronous exchange for task `client`.
    fn sync_accept(&self, packet: &[u8], client: usize) {
        self.core().sync_accept(packet, client);
    }

    fn stats(&self) -> StatDevice {
        self.core().stats()
    }
}

/// State and tasks common to every device.
pub struct DeviceCore {
    name: String,
    protocol_id: ProtocolId,
    out: MessageSender,
    active: AtomicBool,
    registered: AtomicBool,
    stats: Mutex<StatDevice>,
    tasks: Vec<TaskHandle>,
    /// Round-robin cursor over `tasks`.
    client: Mutex<usize>,
}

impl DeviceCore {
    pub fn new(name: &str, protocol_id: ProtocolId, out: MessageSender) -> Self {
        Self {
            name: name.to_string(),
            protocol_id,
            out,
            active: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            stats: Mutex::new(StatDevice {
                device: name.to_string(),
                ..StatDevice::default()
            }),
            tasks: Vec::new(),
            client: Mutex::new(0),
        }
    }

    /// Attach a task. The device's activation is applied to it.
    pub fn add_task(&mut self, task: TaskHandle) {
        task.set_active(self.is_active());
        self.tasks.push(task);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol_id(&self) -> &ProtocolId {
        &self.protocol_id
    }

    pub fn id(&self) -> DeviceId {
        self.protocol_id.id as DeviceId
    }

    pub fn out(&self) -> &MessageSender {
        &self.out
    }

    pub fn tasks(&self) -> &[TaskHandle] {
        &self.tasks
    }

    pub fn task(&self, name: &str) -> Option<&TaskHandle> {
        self.tasks.iter().find(|t| t.name() == name)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }

    /// Switch the device and all its tasks on or off. No-op if unchanged.
    pub fn activate(&self, active: bool) {
        if self.active.swap(active, Ordering::AcqRel) == active {
            return;
        }
        let action = if active { "activated" } else { "deactivated" };
        log::info!("[device] {} {}", self.name, action);
        self.out.send(DeviceActionLog::new(
            "device",
            self.name.as_str(),
            action,
            self.protocol_id.protocol.as_str(),
        ));
        for task in &self.tasks {
            task.set_active(active);
        }
    }

    /// Pull the next pending request, visiting tasks round-robin.
    ///
    /// Returns the index of the task that produced `out`, `None` when the
    /// device is inactive or no task has anything to send.
    pub fn request(&self, out: &mut Vec<u8>) -> Option<usize> {
        out.clear();
        if !self.is_active() || self.tasks.is_empty() {
            return None;
        }
        let count = self.tasks.len();
        let mut client = self.client.lock();
        for _ in 0..count {
            *client = (*client + 1) % count;
            if let Ok(bytes) = self.tasks[*client].pipe().receiver.try_recv() {
                self.stats.lock().sent.add(bytes.len(), true);
                *out = bytes;
                return Some(*client);
            }
        }
        None
    }

    /// Hand a synchronous reply (possibly empty on timeout) back to `client`.
    pub fn sync_accept(&self, packet: &[u8], client: usize) {
        if !packet.is_empty() {
            self.stats.lock().rcvd.add(packet.len(), true);
        }
        if let Some(task) = self.tasks.get(client) {
            task.pipe().sender.send(packet.to_vec());
        }
    }

    /// Deliver an unsolicited frame to task `client`.
    pub fn deliver(&self, packet: &[u8], client: usize) {
        self.stats.lock().rcvd.add(packet.len(), true);
        if let Some(task) = self.tasks.get(client) {
            task.pipe().sender.send(packet.to_vec());
        }
    }

    pub fn stats(&self) -> StatDevice {
        let mut stats = self.stats.lock().clone();
        stats.is_active = self.is_active();
        stats.is_registered = self.is_registered();
        stats.cmds_in_queue = self.tasks.iter().map(TaskHandle::in_queue).sum();
        stats.cmds_processed = self.tasks.iter().map(TaskHandle::processed).sum();
        stats
    }
}

impl Drop for DeviceCore {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        for task in &self.tasks {
            task.set_active(false);
            task.pipe().close();
        }
        for task in &mut self.tasks {
            task.finish();
        }
    }
}
