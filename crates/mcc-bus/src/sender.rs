// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound side of an endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::messages::{Body, Header, Message, MessageId, MessageQueue};

/// Stamps headers and pushes messages into the router ingress.
///
/// Every sender handed out by one router shares the router's id counter, so
/// message ids are unique within the process.
#[derive(Debug, Clone)]
pub struct MessageSender {
    name: String,
    queue: MessageQueue,
    ids: Arc<AtomicU64>,
}

impl MessageSender {
    pub fn new(name: impl Into<String>, queue: MessageQueue, ids: Arc<AtomicU64>) -> Self {
        Self {
            name: name.into(),
            queue,
            ids,
        }
    }

    /// Name used as the `sender` of every outgoing message.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn next_id(&self) -> MessageId {
        self.ids.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn push(&self, receiver: &str, request_id: Option<MessageId>, body: Body) -> Option<MessageId> {
        let id = self.next_id();
        let header = Header::new(id, self.name.as_str(), receiver, request_id);
        let kind = body.kind();
        if self.queue.send(Message { header, body }) {
            Some(id)
        } else {
            log::debug!("[{}] bus closed, {} to '{}' dropped", self.name, kind, receiver);
            None
        }
    }

    /// Send to the kind's default receiver.
    pub fn send(&self, body: impl Into<Body>) -> Option<MessageId> {
        let body = body.into();
        match body.default_receiver() {
            Some(receiver) => self.push(receiver, None, body),
            None => {
                log::warn!(
                    "[{}] {} has no default receiver, dropped",
                    self.name,
                    body.kind()
                );
                None
            }
        }
    }

    /// Send to an explicit receiver.
    pub fn send_to(&self, receiver: &str, body: impl Into<Body>) -> Option<MessageId> {
        self.push(receiver, None, body.into())
    }

    /// Answer `request`: goes back to its sender, correlated by its id.
    pub fn respond(&self, request: &Header, body: impl Into<Body>) -> Option<MessageId> {
        self.push(&request.sender, Some(request.id), body.into())
    }
}
