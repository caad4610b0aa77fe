// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP link.
//!
//! Without a remote port the peer is learned from the first datagram.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::{is_timeout, not_open, read_timeout, PhysicalChannel};
use crate::settings::UdpParams;

const MAX_DATAGRAM: usize = 65_507;

pub struct UdpChannel {
    name: String,
    params: UdpParams,
    socket: Option<UdpSocket>,
    remote: Option<SocketAddr>,
}

impl UdpChannel {
    pub fn new(name: String, params: UdpParams) -> Self {
        Self {
            name,
            params,
            socket: None,
            remote: None,
        }
    }

    /// Bound local address, once connected.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn configured_remote(&self) -> io::Result<Option<SocketAddr>> {
        let Some(port) = self.params.remote_port else {
            return Ok(None);
        };
        Ok((self.params.host.as_str(), port).to_socket_addrs()?.next())
    }
}

impl PhysicalChannel for UdpChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> io::Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let remote = self.configured_remote()?;
        let domain = match remote {
            Some(SocketAddr::V6(_)) => Domain::IPV6,
            _ => Domain::IPV4,
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;

        let unspecified = match domain {
            Domain::IPV6 => IpAddr::from([0u16; 8]),
            _ => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };
        let local = SocketAddr::new(unspecified, self.params.local_port.unwrap_or(0));
        socket.bind(&local.into())?;

        let socket: UdpSocket = socket.into();
        log::debug!(
            "[udp] bound {:?}, remote {:?}",
            socket.local_addr().ok(),
            remote
        );
        self.remote = remote;
        self.socket = Some(socket);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.socket = None;
        if self.params.remote_port.is_none() {
            self.remote = None;
        }
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let socket = self.socket.as_ref().ok_or_else(not_open)?;
        let remote = self.remote.ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "remote address is not known yet")
        })?;
        socket.send_to(data, remote)?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut Vec<u8>, timeout: Duration) -> io::Result<usize> {
        let socket = self.socket.as_ref().ok_or_else(not_open)?;
        socket.set_read_timeout(Some(read_timeout(timeout)))?;

        let mut chunk = vec![0u8; MAX_DATAGRAM];
        match socket.recv_from(&mut chunk) {
            Ok((n, from)) => {
                if self.remote.is_none() {
                    log::debug!("[udp] {} peer is {}", self.name, from);
                    self.remote = Some(from);
                }
                buf.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if is_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn clear(&mut self) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        if socket.set_nonblocking(true).is_err() {
            return;
        }
        let mut chunk = vec![0u8; MAX_DATAGRAM];
        while socket.recv_from(&mut chunk).is_ok() {}
        let _ = socket.set_nonblocking(false);
    }
}
