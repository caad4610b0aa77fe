// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device tasks.
//!
//! A device task runs on its own thread with two inputs:
//!
//! - a typed control queue fed by the encoder service (push, cancel, wake)
//! - a byte pipe shared with the channel manager, driven through an
//!   [`ExchangeHelper`] for request/reply protocols or directly for
//!   streaming ones
//!
//! The device keeps a [`TaskHandle`]; the task body implements [`DeviceTask`]
//! and talks to the outside through its [`TaskContext`].

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mcc_bus::messages::{Cmd, CmdId, CmdState, CmdStatus};
use mcc_bus::{
    make_bi_channel, BlockingChannel, MessageSender, RecvTimeoutError, Runnable, TaskControl,
    TaskRunner, TryRecvError, Wakeup,
};

use crate::helper::{BytePipe, ExchangeHelper};

/// Longest a task sleeps on its control queue between stop-flag checks.
pub const TASK_IDLE: Duration = Duration::from_millis(100);

/// Control input of a device task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskCommand {
    Push(Cmd),
    Cancel(CmdId),
    /// Re-check state (activation changed, stop requested).
    Wake,
}

#[derive(Debug, Default)]
struct TaskCounters {
    in_queue: AtomicUsize,
    processed: AtomicUsize,
}

/// Everything a task body may touch.
pub struct TaskContext {
    name: String,
    device: String,
    active: Arc<AtomicBool>,
    control: BlockingChannel<TaskCommand>,
    helper: ExchangeHelper,
    out: MessageSender,
    counters: Arc<TaskCounters>,
}

impl TaskContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn helper(&self) -> &ExchangeHelper {
        &self.helper
    }

    /// Raw byte pipe towards the channel manager.
    pub fn pipe(&self) -> &BytePipe {
        self.helper.pipe()
    }

    pub fn out(&self) -> &MessageSender {
        &self.out
    }

    /// Next control command, waiting at most `timeout`.
    pub fn next_command(&self, timeout: Duration) -> Option<TaskCommand> {
        match self.control.recv_timeout(timeout) {
            Ok(c) => Some(c),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Closed) => {
                std::thread::sleep(timeout);
                None
            }
        }
    }

    pub fn try_command(&self) -> Option<TaskCommand> {
        match self.control.try_recv() {
            Ok(c) => Some(c),
            Err(TryRecvError::Empty | TryRecvError::Closed) => None,
        }
    }

    /// Publish a command state change.
    pub fn report(&self, cmd: &Cmd, state: CmdStatus) {
        self.out.send(CmdState::new(cmd, state));
    }

    pub fn report_failed(&self, cmd: &Cmd, reason: impl Into<String>) {
        log::debug!("[{}] {} failed", self.name, cmd.name());
        self.out
            .send(CmdState::with_reason(cmd, CmdStatus::Failed, reason));
    }

    pub fn set_in_queue(&self, n: usize) {
        self.counters.in_queue.store(n, Ordering::Relaxed);
    }

    pub fn mark_processed(&self) {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Body of a device task.
pub trait DeviceTask: Send + 'static {
    fn prepare(&mut self, _ctx: &TaskContext) -> bool {
        true
    }

    /// One iteration. Blocking waits should be bounded by [`TASK_IDLE`] or
    /// a similar short timeout so stop requests are seen.
    fn tick(&mut self, ctx: &TaskContext);
}

struct ControlWake(BlockingChannel<TaskCommand>);

impl Wakeup for ControlWake {
    fn wake(&self) {
        self.0.send(TaskCommand::Wake);
    }
}

struct TaskWorker<T> {
    ctx: TaskContext,
    task: T,
}

impl<T: DeviceTask> Runnable for TaskWorker<T> {
    fn prepare(&mut self, _ctl: &TaskControl) -> bool {
        self.task.prepare(&self.ctx)
    }

    fn tick(&mut self, _ctl: &TaskControl) {
        self.task.tick(&self.ctx);
    }

    fn wakeup(&self) -> Option<Arc<dyn Wakeup>> {
        Some(Arc::new(ControlWake(self.ctx.control.clone())))
    }
}

/// Device-side handle of a running task.
pub struct TaskHandle {
    name: String,
    active: Arc<AtomicBool>,
    control: BlockingChannel<TaskCommand>,
    pipe: BytePipe,
    counters: Arc<TaskCounters>,
    runner: TaskRunner,
}

impl TaskHandle {
    /// Start `task` as `name` for `device`, inactive.
    pub fn spawn<T: DeviceTask>(
        name: &str,
        device: &str,
        out: MessageSender,
        tries: usize,
        task: T,
    ) -> io::Result<Self> {
        let bi = make_bi_channel::<Vec<u8>>();
        let active = Arc::new(AtomicBool::new(false));
        let control = BlockingChannel::new();
        let counters = Arc::new(TaskCounters::default());

        let ctx = TaskContext {
            name: name.to_string(),
            device: device.to_string(),
            active: active.clone(),
            control: control.clone(),
            helper: ExchangeHelper::new(bi.forward, tries),
            out,
            counters: counters.clone(),
        };
        let runner = TaskRunner::spawn(name, TaskWorker { ctx, task })?;

        Ok(Self {
            name: name.to_string(),
            active,
            control,
            pipe: bi.backward,
            counters,
            runner,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
        self.control.send(TaskCommand::Wake);
    }

    pub fn push(&self, cmd: Cmd) -> bool {
        self.control.send(TaskCommand::Push(cmd))
    }

    pub fn cancel(&self, cmd_id: CmdId) -> bool {
        self.control.send(TaskCommand::Cancel(cmd_id))
    }

    /// Channel manager side of the byte pipe.
    pub fn pipe(&self) -> &BytePipe {
        &self.pipe
    }

    pub fn in_queue(&self) -> usize {
        self.counters.in_queue.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> usize {
        self.counters.processed.load(Ordering::Relaxed)
    }

    /// Stop the task, unblocking any exchange in flight.
    pub fn finish(&mut self) -> bool {
        self.runner.request_stop();
        self.pipe.close();
        let done = self.runner.finish(true);
        self.control.close();
        done
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.finish();
    }
}
