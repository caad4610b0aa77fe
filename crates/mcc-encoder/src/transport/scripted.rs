// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory link whose traffic is scripted by the test.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::{ChannelFactory, PhysicalChannel};

#[derive(Default)]
pub(crate) struct Script {
    /// Chunks handed out by `receive`, one per call.
    pub inbound: VecDeque<Vec<u8>>,
    /// Queued into `inbound` on each send, one per send.
    pub replies: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    pub refuse_connect: bool,
    pub open: bool,
    pub clears: usize,
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedLink {
    pub script: Arc<Mutex<Script>>,
}

impl ScriptedLink {
    pub fn factory(&self) -> ChannelFactory {
        let link = self.clone();
        Arc::new(move |_| Some(Box::new(link.clone()) as Box<dyn PhysicalChannel>))
    }

    pub fn push_inbound(&self, bytes: &[u8]) {
        self.script.lock().inbound.push_back(bytes.to_vec());
    }

    pub fn push_reply(&self, bytes: &[u8]) {
        self.script.lock().replies.push_back(bytes.to_vec());
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.script.lock().sent.clone()
    }
}

impl PhysicalChannel for ScriptedLink {
    fn name(&self) -> &str {
        "scripted"
    }

    fn connect(&mut self) -> io::Result<()> {
        let mut s = self.script.lock();
        if s.refuse_connect {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }
        s.open = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.script.lock().open = false;
    }

    fn is_open(&self) -> bool {
        self.script.lock().open
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let mut s = self.script.lock();
        if !s.open {
            return Err(super::not_open());
        }
        s.sent.push(data.to_vec());
        if let Some(reply) = s.replies.pop_front() {
            s.inbound.push_back(reply);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut Vec<u8>, timeout: Duration) -> io::Result<usize> {
        {
            let mut s = self.script.lock();
            if !s.open {
                return Err(super::not_open());
            }
            if let Some(chunk) = s.inbound.pop_front() {
                buf.extend_from_slice(&chunk);
                return Ok(chunk.len());
            }
        }
        thread::sleep(timeout.min(Duration::from_millis(5)));
        Ok(0)
    }

    fn clear(&mut self) {
        let mut s = self.script.lock();
        s.inbound.clear();
        s.clears += 1;
    }
}
