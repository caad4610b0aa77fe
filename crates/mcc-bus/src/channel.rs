// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking typed FIFO channel.
//!
//! Every cross-thread hop in the backend goes through a [`BlockingChannel`]:
//! service inboxes, the router ingress, the byte pipes between device tasks
//! and channel managers, and the "done" signal of a task runner.
//!
//! # Semantics
//! - FIFO per channel, any number of producers and consumers
//! - `close()` clears pending values and wakes every blocked receiver
//! - after close, sends report `false` (the value is dropped) and receives
//!   return `Closed` / `None` immediately

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Error returned by [`BlockingChannel::try_recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// No value queued right now.
    Empty,
    /// Channel was closed.
    Closed,
}

/// Error returned by [`BlockingChannel::recv_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    /// Nothing arrived before the deadline.
    Timeout,
    /// Channel was closed.
    Closed,
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryRecvError::Empty => write!(f, "channel empty"),
            TryRecvError::Closed => write!(f, "channel closed"),
        }
    }
}

impl fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvTimeoutError::Timeout => write!(f, "receive timed out"),
            RecvTimeoutError::Closed => write!(f, "channel closed"),
        }
    }
}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

/// Thread-safe FIFO with blocking receive.
///
/// Cloning yields another handle to the same queue.
pub struct BlockingChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BlockingChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for BlockingChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BlockingChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("BlockingChannel")
            .field("len", &state.queue.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T> BlockingChannel<T> {
    /// Create an open, empty channel.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    closed: false,
                }),
                ready: Condvar::new(),
            }),
        }
    }

    /// Enqueue a value.
    ///
    /// Returns `false` when the channel is closed; the value is dropped.
    pub fn send(&self, value: T) -> bool {
        let mut state = self.shared.state.lock();
        if state.closed {
            return false;
        }
        state.queue.push_back(value);
        drop(state);
        self.shared.ready.notify_one();
        true
    }

    /// Take the next value without blocking.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(TryRecvError::Closed);
        }
        state.queue.pop_front().ok_or(TryRecvError::Empty)
    }

    /// Block until a value arrives. `None` only once the channel is closed.
    pub fn recv_blocking(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(value) = state.queue.pop_front() {
                return Some(value);
            }
            self.shared.ready.wait(&mut state);
        }
    }

    /// Block until a value arrives or `timeout` elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return Err(RecvTimeoutError::Closed);
            }
            if let Some(value) = state.queue.pop_front() {
                return Ok(value);
            }
            if self
                .shared
                .ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                // A value may have raced in with the timeout.
                if state.closed {
                    return Err(RecvTimeoutError::Closed);
                }
                return state.queue.pop_front().ok_or(RecvTimeoutError::Timeout);
            }
        }
    }

    /// Close the channel, drop pending values and wake every waiter.
    ///
    /// Returns `false` if the channel was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        state.queue.clear();
        drop(state);
        self.shared.ready.notify_all();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of queued values.
    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Channel pairs
// ============================================================================

/// A sending side and a receiving side, possibly of different value types.
pub struct ChannelPair<S, R> {
    pub sender: BlockingChannel<S>,
    pub receiver: BlockingChannel<R>,
}

impl<S, R> Clone for ChannelPair<S, R> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

impl<S, R> ChannelPair<S, R> {
    pub fn new(sender: BlockingChannel<S>, receiver: BlockingChannel<R>) -> Self {
        Self { sender, receiver }
    }

    /// Close both directions.
    pub fn close(&self) {
        self.sender.close();
        self.receiver.close();
    }
}

/// Two mirrored pairs sharing the same two queues.
///
/// What `forward` sends, `backward` receives and the other way round. A device
/// task keeps `forward`, the channel manager talks to it through `backward`.
pub struct BiChannelPair<T> {
    pub forward: ChannelPair<T, T>,
    pub backward: ChannelPair<T, T>,
}

/// Build a request/response pipe between two threads.
pub fn make_bi_channel<T>() -> BiChannelPair<T> {
    let a = BlockingChannel::new();
    let b = BlockingChannel::new();
    BiChannelPair {
        forward: ChannelPair::new(a.clone(), b.clone()),
        backward: ChannelPair::new(b, a),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let ch = BlockingChannel::new();
        assert!(ch.send(1));
        assert!(ch.send(2));
        assert!(ch.send(3));
        assert_eq!(ch.len(), 3);
        assert_eq!(ch.try_recv(), Ok(1));
        assert_eq!(ch.recv_blocking(), Some(2));
        assert_eq!(ch.recv_timeout(Duration::from_millis(1)), Ok(3));
        assert_eq!(ch.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_recv_timeout_expires() {
        let ch: BlockingChannel<u8> = BlockingChannel::new();
        let start = Instant::now();
        let res = ch.recv_timeout(Duration::from_millis(30));
        assert_eq!(res, Err(RecvTimeoutError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_send_after_close_is_rejected() {
        let ch = BlockingChannel::new();
        ch.send(7u32);
        assert!(ch.close());
        assert!(!ch.send(8));
        assert!(ch.is_empty());
        assert_eq!(ch.try_recv(), Err(TryRecvError::Closed));
        assert_eq!(ch.recv_blocking(), None);
        assert_eq!(
            ch.recv_timeout(Duration::from_millis(1)),
            Err(RecvTimeoutError::Closed)
        );
    }

    #[test]
    fn test_second_close_reports_false() {
        let ch: BlockingChannel<()> = BlockingChannel::new();
        assert!(ch.close());
        assert!(!ch.close());
        assert!(ch.is_closed());
    }

    #[test]
    fn test_close_wakes_blocked_receiver() {
        let ch: BlockingChannel<u32> = BlockingChannel::new();
        let rx = ch.clone();
        let handle = thread::spawn(move || rx.recv_blocking());

        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        ch.close();

        assert_eq!(handle.join().unwrap(), None);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_close_wakes_timed_receiver() {
        let ch: BlockingChannel<u32> = BlockingChannel::new();
        let rx = ch.clone();
        let handle = thread::spawn(move || rx.recv_timeout(Duration::from_secs(10)));

        thread::sleep(Duration::from_millis(20));
        ch.close();

        assert_eq!(handle.join().unwrap(), Err(RecvTimeoutError::Closed));
    }

    #[test]
    fn test_cross_thread_delivery() {
        let ch = BlockingChannel::new();
        let tx = ch.clone();
        let producer = thread::spawn(move || {
            for i in 0..100u32 {
                tx.send(i);
            }
        });

        let mut got = Vec::new();
        while got.len() < 100 {
            if let Ok(v) = ch.recv_timeout(Duration::from_secs(1)) {
                got.push(v);
            }
        }
        producer.join().unwrap();
        assert_eq!(got, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_bi_channel_is_mirrored() {
        let pair = make_bi_channel::<Vec<u8>>();
        pair.forward.sender.send(vec![1, 2, 3]);
        assert_eq!(pair.backward.receiver.try_recv(), Ok(vec![1, 2, 3]));

        pair.backward.sender.send(vec![9]);
        assert_eq!(pair.forward.receiver.try_recv(), Ok(vec![9]));
    }

    #[test]
    fn test_pair_close_closes_both_sides() {
        let pair = make_bi_channel::<u8>();
        pair.backward.close();
        assert!(pair.forward.sender.is_closed());
        assert!(pair.forward.receiver.is_closed());
    }
}
