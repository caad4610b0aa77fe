// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP client link.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{is_timeout, not_open, read_timeout, PhysicalChannel};
use crate::settings::TcpParams;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct TcpChannel {
    name: String,
    params: TcpParams,
    stream: Option<TcpStream>,
}

impl TcpChannel {
    pub fn new(name: String, params: TcpParams) -> Self {
        Self {
            name,
            params,
            stream: None,
        }
    }

    fn resolve(&self) -> io::Result<SocketAddr> {
        (self.params.host.as_str(), self.params.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("cannot resolve '{}'", self.params.host),
                )
            })
    }
}

impl PhysicalChannel for TcpChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> io::Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        stream.set_nodelay(true)?;
        socket2::SockRef::from(&stream).set_keepalive(true)?;
        log::debug!("[tcp] {} connected", addr);
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_open)?;
        stream.write_all(data)
    }

    fn receive(&mut self, buf: &mut Vec<u8>, timeout: Duration) -> io::Result<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_open)?;
        stream.set_read_timeout(Some(read_timeout(timeout)))?;

        let mut chunk = [0u8; 4096];
        match stream.read(&mut chunk) {
            Ok(0) => {
                log::debug!("[tcp] {} closed by peer", self.name);
                self.disconnect();
                Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "connection closed by peer",
                ))
            }
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if is_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn clear(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if stream.set_nonblocking(true).is_err() {
            return;
        }
        let mut chunk = [0u8; 4096];
        while let Ok(n) = stream.read(&mut chunk) {
            if n == 0 {
                break;
            }
        }
        let _ = stream.set_nonblocking(false);
    }
}
