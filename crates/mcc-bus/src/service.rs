// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service base.
//!
//! A service is an endpoint with an inbox, a [`MessageSender`] bound to its
//! name, and a [`ServiceHandler`] receiving dispatched messages. The
//! [`ServiceRunner`] drives it as a [`Runnable`]:
//!
//! ```text
//! prepare   SystemComponentState(true) -> manager
//!           SystemState_Request        -> manager
//!           [wait for SystemState(started)]   (optional)
//! tick      inbox recv (bounded) -> dispatch -> idle hook
//! shutdown  stop hook, SystemComponentState(false), close inbox
//! ```

use std::io;
use std::time::Duration;

use crate::channel::RecvTimeoutError;
use crate::config::ServiceConfig;
use crate::error::BusError;
use crate::messages::{
    dispatch, Header, Message, MessageProcessor, MessageQueue, SystemComponentState,
    SystemState, SystemStateRequest,
};
use crate::router::LocalRouter;
use crate::runner::{Runnable, TaskControl, TaskRunner};
use crate::sender::MessageSender;

/// Inbox, outbox and identity of a service.
#[derive(Debug, Clone)]
pub struct ServiceBase {
    name: String,
    input: MessageQueue,
    out: MessageSender,
    recv_timeout: Duration,
}

impl ServiceBase {
    /// Bind to the endpoint `name` of `router`.
    pub fn new(router: &LocalRouter, name: &str, config: &ServiceConfig) -> Result<Self, BusError> {
        let input = router.receiver(name)?;
        let out = router.sender(name);
        Ok(Self::from_parts(name, input, out, config.recv_timeout()))
    }

    pub fn from_parts(
        name: &str,
        input: MessageQueue,
        out: MessageSender,
        recv_timeout: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            input,
            out,
            recv_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn out(&self) -> &MessageSender {
        &self.out
    }

    pub fn input(&self) -> &MessageQueue {
        &self.input
    }

    /// Next inbound message, waiting at most the configured timeout.
    pub fn recv(&self) -> Option<Message> {
        match self.input.recv_timeout(self.recv_timeout) {
            Ok(m) => Some(m),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Closed) => {
                // Closed inbox returns at once; keep the loop from spinning.
                std::thread::sleep(self.recv_timeout);
                None
            }
        }
    }

    /// Tell the manager this service went up or down.
    pub fn announce(&self, started: bool) {
        self.out.send(SystemComponentState {
            started,
            reason: String::new(),
        });
    }
}

/// Message handling side of a service.
pub trait ServiceHandler: MessageProcessor + Send + 'static {
    fn base(&self) -> &ServiceBase;

    /// Block in `prepare` until the manager reports the system started.
    fn waits_for_system(&self) -> bool {
        false
    }

    /// Runs at the end of `prepare`. `false` aborts the service.
    fn on_started(&mut self) -> bool {
        true
    }

    /// Runs after every tick.
    fn on_idle(&mut self) {}

    /// Runs first thing in `shutdown`.
    fn on_stop(&mut self) {}
}

/// Captures the first `SystemState(started = true)`.
#[derive(Default)]
struct StartWaiter {
    started: Option<(Header, SystemState)>,
}

impl MessageProcessor for StartWaiter {
    fn on_system_state(&mut self, header: Header, body: SystemState) {
        if body.started {
            self.started = Some((header, body));
        }
    }
}

/// Drives a [`ServiceHandler`] on a task runner.
pub struct ServiceRunner<H> {
    handler: H,
}

impl<H: ServiceHandler> ServiceRunner<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Swallow traffic until the system is up, then replay the
    /// `SystemState` that proved it into the handler.
    fn wait_system_started(&mut self, ctl: &TaskControl) -> bool {
        while ctl.is_running() {
            let Some(msg) = self.handler.base().recv() else {
                continue;
            };
            let mut waiter = StartWaiter::default();
            dispatch(&mut waiter, msg);
            if let Some((header, state)) = waiter.started {
                self.handler.on_system_state(header, state);
                return true;
            }
        }
        false
    }
}

impl<H: ServiceHandler> Runnable for ServiceRunner<H> {
    fn prepare(&mut self, ctl: &TaskControl) -> bool {
        let base = self.handler.base();
        base.announce(true);
        base.out().send(SystemStateRequest);

        if self.handler.waits_for_system() {
            if !self.wait_system_started(ctl) {
                return false;
            }
            log::info!("[{}] system started", self.handler.base().name());
        }
        self.handler.on_started()
    }

    fn tick(&mut self, _ctl: &TaskControl) {
        if let Some(msg) = self.handler.base().recv() {
            dispatch(&mut self.handler, msg);
        }
        self.handler.on_idle();
    }

    fn shutdown(&mut self, _ctl: &TaskControl) {
        self.handler.on_stop();
        let base = self.handler.base();
        base.announce(false);
        base.input().close();
    }
}

/// Start `handler` on its own thread, named after its endpoint.
pub fn spawn_service<H: ServiceHandler>(handler: H) -> io::Result<TaskRunner> {
    let name = handler.base().name().to_string();
    TaskRunner::spawn(&name, ServiceRunner::new(handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Cmd;
    use crate::names;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    struct Recorder {
        base: ServiceBase,
        wait: bool,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl MessageProcessor for Recorder {
        fn on_cmd(&mut self, _header: Header, body: Cmd) {
            self.seen.lock().push(body.name());
        }

        fn on_system_state(&mut self, _header: Header, body: SystemState) {
            self.seen.lock().push(format!("state:{}", body.started));
        }
    }

    impl ServiceHandler for Recorder {
        fn base(&self) -> &ServiceBase {
            &self.base
        }

        fn waits_for_system(&self) -> bool {
            self.wait
        }
    }

    /// Service whose outbox is a plain queue the test can inspect.
    fn setup(wait: bool) -> (Recorder, MessageQueue, Arc<Mutex<Vec<String>>>) {
        let outbox = MessageQueue::new();
        let out = MessageSender::new("svc", outbox.clone(), Arc::new(AtomicU64::new(0)));
        let base = ServiceBase::from_parts("svc", MessageQueue::new(), out, Duration::from_millis(10));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let rec = Recorder {
            base,
            wait,
            seen: seen.clone(),
        };
        (rec, outbox, seen)
    }

    fn cmd() -> Cmd {
        Cmd {
            cmd_id: 1,
            device: "d".into(),
            trait_: "T".into(),
            command: "c".into(),
            params: vec![],
        }
    }

    fn state(started: bool) -> SystemState {
        SystemState {
            started,
            reason: String::new(),
        }
    }

    #[test]
    fn test_announces_on_start_and_stop() {
        let (rec, outbox, _seen) = setup(false);
        let input = rec.base.input().clone();
        let mut runner = spawn_service(rec).unwrap();
        thread::sleep(Duration::from_millis(30));
        runner.finish(true);

        let mut kinds = Vec::new();
        while let Ok(m) = outbox.try_recv() {
            assert_eq!(m.header.receiver, names::CORE_MANAGER);
            kinds.push(m.kind());
        }
        assert_eq!(
            kinds,
            vec![
                "SystemComponentState",
                "SystemState_Request",
                "SystemComponentState"
            ]
        );
        assert!(input.is_closed());
    }

    #[test]
    fn test_waits_for_system_and_replays_state() {
        let (rec, _outbox, seen) = setup(true);
        let input = rec.base.input().clone();

        // Traffic before the system is up is swallowed.
        input.send(Message::new(Header::new(1, "x", "svc", None), cmd()));
        input.send(Message::new(Header::new(2, names::CORE_MANAGER, "svc", None), state(false)));
        input.send(Message::new(Header::new(3, names::CORE_MANAGER, "svc", None), state(true)));
        input.send(Message::new(Header::new(4, "x", "svc", None), cmd()));

        let mut runner = spawn_service(rec).unwrap();
        let start = Instant::now();
        while seen.lock().len() < 2 && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }
        runner.finish(true);

        assert_eq!(*seen.lock(), vec!["state:true".to_string(), "d.T.c".to_string()]);
    }

    #[test]
    fn test_stop_while_waiting_for_system() {
        let (rec, _outbox, seen) = setup(true);
        let mut runner = spawn_service(rec).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(runner.finish(true));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_bind_to_router_endpoint() {
        let mut router = LocalRouter::new();
        router.add("svc").unwrap();
        let base = ServiceBase::new(&router, "svc", &ServiceConfig::default()).unwrap();
        assert_eq!(base.name(), "svc");
        assert_eq!(base.out().name(), "svc");
        assert!(ServiceBase::new(&router, "nope", &ServiceConfig::default()).is_err());
    }
}
