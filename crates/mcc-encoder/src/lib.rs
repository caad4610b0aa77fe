// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device exchange engine of the MCC ground station backend.
//!
//! One [`EncoderService`] runs per wire protocol. It creates a
//! [`ChannelManager`] per physical link (TCP, UDP or serial) and a
//! [`Device`] per connected remote unit. Devices own command tasks; the
//! channel manager multiplexes their traffic over the link:
//!
//! ```text
//!  bus ──> EncoderService ──> Device ──> tasks ──pipe──> ChannelManager ──> Exchanger ──> link
//!                                                              ▲                 │
//!                                                              └── PacketSearcher ┘
//! ```
//!
//! # Protocols
//!
//! | name       | mode  | framing                                    |
//! |------------|-------|--------------------------------------------|
//! | `Internal` | sync  | `A5 5A len:u32le json xor8`                |
//! | `Mavlink`  | async | MAVLink v1, `FE len seq sys comp msg .. crc` |
//! | `Photon`   | async | not implemented                            |
//!
//! # Example
//!
//! ```no_run
//! use mcc_bus::{LocalRouter, ServiceBase, ServiceConfig, spawn_service};
//! use mcc_encoder::{EncoderConfig, EncoderService, MavlinkProtocol, Protocol};
//!
//! let config = EncoderConfig::default();
//! let protocol = MavlinkProtocol::new(&config);
//! let mut router = LocalRouter::new();
//! router.add(protocol.service_name()).unwrap();
//! let base = ServiceBase::new(&router, protocol.service_name(), &ServiceConfig::default()).unwrap();
//! let _task = spawn_service(EncoderService::new(base, protocol, &config)).unwrap();
//! ```

pub mod channel_manager;
pub mod config;
pub mod device;
mod error;
pub mod exchanger;
pub mod helper;
pub mod packet;
pub mod protocol;
pub mod service;
pub mod settings;
pub mod task;
pub mod transport;

pub use channel_manager::{ChannelManager, ExchangeMode, ManagerTimings};
pub use config::{ConfigError, EncoderConfig};
pub use device::{Device, DeviceCore};
pub use error::{ExchangeError, ExchangerError};
pub use exchanger::{ExchangeState, ExchangeStats, Exchanger};
pub use helper::ExchangeHelper;
pub use packet::{Coder, PacketDetails, PacketSearcher, SearchResult};
pub use protocol::{InternalProtocol, MavlinkProtocol, PhotonProtocol, Protocol};
pub use service::EncoderService;
pub use settings::{NetChannel, SettingsError, Transport};
pub use task::{DeviceTask, TaskContext, TaskHandle};
pub use transport::{default_factory, make_channel, ChannelFactory, PhysicalChannel};
