// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process message bus of the MCC ground station backend.
//!
//! # Building blocks
//!
//! - [`BlockingChannel`]: closable FIFO with blocking/timed/try receive
//! - [`TaskRunner`]: one OS thread per [`Runnable`], cooperative stop
//! - [`LocalRouter`] + [`RouterService`]: named endpoints, one ingress
//! - [`ServiceBase`] + [`ServiceHandler`]: actor skeleton with the startup
//!   handshake against the [`ManagerService`]
//!
//! # Example
//!
//! ```no_run
//! use mcc_bus::{names, LocalRouter, RouterConfig, RouterService, TaskRunner};
//! use std::sync::Arc;
//!
//! let mut router = LocalRouter::new();
//! router.add(names::CORE_MANAGER).unwrap();
//! router.add(names::UI).unwrap();
//! let router = Arc::new(router);
//! let _worker = TaskRunner::spawn(
//!     names::CORE_ROUTER,
//!     RouterService::new(router.clone(), RouterConfig::default()),
//! )
//! .unwrap();
//! ```

pub mod channel;
pub mod config;
mod error;
pub mod manager;
pub mod messages;
pub mod names;
pub mod router;
pub mod runner;
pub mod sender;
pub mod service;

pub use channel::{
    make_bi_channel, BiChannelPair, BlockingChannel, ChannelPair, RecvTimeoutError, TryRecvError,
};
pub use config::{ManagerConfig, RouterConfig, ServiceConfig};
pub use error::BusError;
pub use manager::ManagerService;
pub use messages::{dispatch, Body, Envelope, Header, Message, MessageId, MessageProcessor, MessageQueue};
pub use router::{LocalRouter, RouterService};
pub use runner::{Runnable, TaskControl, TaskRunner, Wakeup};
pub use sender::MessageSender;
pub use service::{spawn_service, ServiceBase, ServiceHandler, ServiceRunner};
