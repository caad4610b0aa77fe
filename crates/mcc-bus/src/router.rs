// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local message router.
//!
//! [`LocalRouter`] is the endpoint registry: every endpoint gets its own
//! inbound [`MessageQueue`], every sender pushes into one shared ingress.
//! Registration happens during wiring only; the first call handing out a
//! queue or a sender locks the registry. [`RouterService`] is the worker that
//! drains the ingress and forwards each message to its receiver.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::channel::RecvTimeoutError;
use crate::config::RouterConfig;
use crate::error::BusError;
use crate::messages::{Error, Header, Message, MessageQueue};
use crate::names;
use crate::runner::{Runnable, TaskControl};
use crate::sender::MessageSender;

// ============================================================================
// Registry
// ============================================================================

/// Endpoint registry plus the shared ingress queue.
#[derive(Debug)]
pub struct LocalRouter {
    ingress: MessageQueue,
    endpoints: BTreeMap<String, MessageQueue>,
    locked: AtomicBool,
    ids: Arc<AtomicU64>,
}

impl Default for LocalRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRouter {
    pub fn new() -> Self {
        Self {
            ingress: MessageQueue::new(),
            endpoints: BTreeMap::new(),
            locked: AtomicBool::new(false),
            ids: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register an endpoint. Fails once the registry is locked.
    pub fn add(&mut self, name: &str) -> Result<(), BusError> {
        if self.is_locked() {
            return Err(BusError::Locked(name.to_string()));
        }
        if self.endpoints.contains_key(name) {
            return Err(BusError::Duplicate(name.to_string()));
        }
        self.endpoints.insert(name.to_string(), MessageQueue::new());
        Ok(())
    }

    /// Freeze the registry.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Registered endpoint names, sorted.
    pub fn locals(&self) -> Vec<String> {
        self.endpoints.keys().cloned().collect()
    }

    /// Inbound queue of `name`. Locks the registry.
    pub fn receiver(&self, name: &str) -> Result<MessageQueue, BusError> {
        self.lock();
        self.endpoints
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::UnknownEndpoint(name.to_string()))
    }

    /// Sender stamping messages with `name`. Locks the registry.
    pub fn sender(&self, name: &str) -> MessageSender {
        self.lock();
        MessageSender::new(name, self.ingress.clone(), Arc::clone(&self.ids))
    }

    /// Queue depth of every endpoint.
    pub fn backlog(&self) -> Vec<(String, usize)> {
        self.endpoints
            .iter()
            .map(|(name, q)| (name.clone(), q.len()))
            .collect()
    }

    /// Close the ingress and every endpoint queue.
    pub fn close_all(&self) {
        self.ingress.close();
        for q in self.endpoints.values() {
            q.close();
        }
    }

    /// Deliver one message. Returns `false` if it could not be delivered.
    ///
    /// - multicast: a copy to every endpoint except the sender
    /// - unknown receiver: an `Error` back to the sender, unless the sender
    ///   is the router itself
    pub fn route(&self, message: Message) -> bool {
        if message.header.is_multicast() {
            self.multicast(message);
            return true;
        }

        if let Some(queue) = self.endpoints.get(&message.header.receiver) {
            return queue.send(message);
        }

        let Message { header, body } = message;
        log::debug!(
            "[router] {} from '{}': destination unknown: {}",
            body.kind(),
            header.sender,
            header.receiver
        );
        if header.sender == names::CORE_ROUTER {
            return false;
        }
        let Some(origin) = self.endpoints.get(&header.sender) else {
            log::warn!(
                "[router] '{}' is not registered, error reply dropped",
                header.sender
            );
            return false;
        };
        let id = self.ids.fetch_add(1, Ordering::Relaxed) + 1;
        let reply = Message::new(
            Header::new(id, names::CORE_ROUTER, header.sender.as_str(), Some(header.id)),
            Error::new(format!("destination unknown: {}", header.receiver)),
        );
        origin.send(reply);
        false
    }

    fn multicast(&self, message: Message) {
        for (name, queue) in &self.endpoints {
            if *name == message.header.sender {
                continue;
            }
            let mut copy = message.clone();
            copy.header.receiver = name.clone();
            queue.send(copy);
        }
    }
}

// ============================================================================
// Router worker
// ============================================================================

/// Forwards ingress traffic to endpoint queues.
pub struct RouterService {
    router: Arc<LocalRouter>,
    ingress: MessageQueue,
    config: RouterConfig,
    last_scan: Instant,
}

impl RouterService {
    pub fn new(router: Arc<LocalRouter>, config: RouterConfig) -> Self {
        router.lock();
        let ingress = router.ingress.clone();
        Self {
            router,
            ingress,
            config,
            last_scan: Instant::now(),
        }
    }

    /// Endpoints whose queue grew past the threshold, once per interval.
    fn scan_backlog(&mut self) -> Vec<(String, usize)> {
        if self.last_scan.elapsed() < self.config.backlog_interval() {
            return Vec::new();
        }
        self.last_scan = Instant::now();

        let overloaded: Vec<(String, usize)> = self
            .router
            .backlog()
            .into_iter()
            .filter(|(_, depth)| *depth > self.config.backlog_threshold)
            .collect();
        for (name, depth) in &overloaded {
            log::warn!("[router] endpoint '{}' has {} pending messages", name, depth);
        }
        overloaded
    }
}

impl Runnable for RouterService {
    fn prepare(&mut self, _ctl: &TaskControl) -> bool {
        log::info!(
            "[router] forwarding for {} endpoints",
            self.router.endpoints.len()
        );
        true
    }

    fn tick(&mut self, ctl: &TaskControl) {
        let _ = self.scan_backlog();
        match self.ingress.recv_timeout(self.config.recv_timeout()) {
            Ok(message) => {
                self.router.route(message);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Closed) => ctl.request_stop(),
        }
    }
}
