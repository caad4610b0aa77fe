// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thread-owning task runner.
//!
//! A [`Runnable`] is driven on its own OS thread through a
//! `prepare -> tick* -> shutdown` sequence. Stopping is cooperative: the
//! runner raises a stop flag, pokes the task's optional [`Wakeup`] hook so a
//! blocked `tick` returns early, and waits on a "done" channel the worker
//! closes once `shutdown` has run.

use crate::channel::{BlockingChannel, RecvTimeoutError};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default bound for a synchronous [`TaskRunner::finish`].
pub const DEFAULT_FINISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can interrupt a blocked `tick`.
pub trait Wakeup: Send + Sync {
    fn wake(&self);
}

/// Stop flag shared between the runner and its worker thread.
#[derive(Debug, Clone)]
pub struct TaskControl {
    running: Arc<AtomicBool>,
}

impl TaskControl {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// `false` once a stop was requested.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the loop to exit after the current tick.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Lifecycle hooks run on the worker thread.
pub trait Runnable: Send + 'static {
    /// Called once before the loop. Returning `false` skips the loop; `shutdown`
    /// still runs.
    fn prepare(&mut self, _ctl: &TaskControl) -> bool {
        true
    }

    /// One iteration. Should return within a bounded time or be wakeable.
    fn tick(&mut self, ctl: &TaskControl);

    /// Called exactly once after the loop ends.
    fn shutdown(&mut self, _ctl: &TaskControl) {}

    /// Hook used by `finish` to unblock a waiting `tick`.
    fn wakeup(&self) -> Option<Arc<dyn Wakeup>> {
        None
    }
}

/// Owns the worker thread of one [`Runnable`].
pub struct TaskRunner {
    name: String,
    control: TaskControl,
    done: BlockingChannel<()>,
    wakeup: Option<Arc<dyn Wakeup>>,
    handle: Option<JoinHandle<()>>,
    finish_timeout: Duration,
}

impl TaskRunner {
    /// Spawn `task` on a new thread named `name`.
    pub fn spawn<R: Runnable>(name: &str, mut task: R) -> io::Result<Self> {
        let control = TaskControl::new();
        let done = BlockingChannel::new();
        let wakeup = task.wakeup();

        let ctl = control.clone();
        let done_tx = done.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                if task.prepare(&ctl) {
                    while ctl.is_running() {
                        task.tick(&ctl);
                    }
                }
                ctl.request_stop();
                task.shutdown(&ctl);
                done_tx.close();
            })?;

        log::debug!("[runner] started '{}'", name);

        Ok(Self {
            name: name.to_string(),
            control,
            done,
            wakeup,
            handle: Some(handle),
            finish_timeout: DEFAULT_FINISH_TIMEOUT,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Override the bound used by `finish(true)`.
    pub fn set_finish_timeout(&mut self, timeout: Duration) {
        self.finish_timeout = timeout;
    }

    /// Raise the stop flag without waiting.
    pub fn request_stop(&self) {
        self.control.request_stop();
        if let Some(w) = &self.wakeup {
            w.wake();
        }
    }

    /// `true` once the worker has run `shutdown`.
    pub fn is_finished(&self) -> bool {
        self.done.is_closed()
    }

    /// Stop the worker.
    ///
    /// With `wait`, blocks up to the finish timeout for the worker to exit and
    /// joins it. Returns `false` if the worker is stuck; the thread is then
    /// detached.
    pub fn finish(&mut self, wait: bool) -> bool {
        self.request_stop();
        if !wait {
            return true;
        }
        let Some(handle) = self.handle.take() else {
            return true;
        };

        match self.done.recv_timeout(self.finish_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                log::error!(
                    "[runner] task '{}' is stuck, not finished after {:?}",
                    self.name,
                    self.finish_timeout
                );
                false
            }
            // The done channel never carries values, it is only closed.
            Ok(()) | Err(RecvTimeoutError::Closed) => {
                if handle.join().is_err() {
                    log::error!("[runner] task '{}' panicked", self.name);
                }
                log::debug!("[runner] finished '{}'", self.name);
                true
            }
        }
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.finish(true);
    }
}
