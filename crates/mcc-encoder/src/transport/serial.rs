// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serial port link (8N1, no flow control).

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::{is_timeout, not_open, read_timeout, PhysicalChannel};
use crate::settings::ComParams;

const OPEN_TIMEOUT: Duration = Duration::from_millis(500);

pub struct SerialChannel {
    name: String,
    params: ComParams,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    pub fn new(name: String, params: ComParams) -> Self {
        Self {
            name,
            params,
            port: None,
        }
    }
}

impl PhysicalChannel for SerialChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> io::Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(self.params.port.as_str(), self.params.baud)
            .timeout(OPEN_TIMEOUT)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .open()?;
        port.clear(ClearBuffer::All)?;
        log::debug!("[serial] {} opened at {}", self.params.port, self.params.baud);
        self.port = Some(port);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port.as_mut().ok_or_else(not_open)?;
        port.write_all(data)?;
        port.flush()
    }

    fn receive(&mut self, buf: &mut Vec<u8>, timeout: Duration) -> io::Result<usize> {
        let port = self.port.as_mut().ok_or_else(not_open)?;
        port.set_timeout(read_timeout(timeout))?;
        let mut chunk = [0u8; 4096];
        match port.read(&mut chunk) {
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if is_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn clear(&mut self) {
        if let Some(port) = self.port.as_ref() {
            if let Err(e) = port.clear(ClearBuffer::Input) {
                log::debug!("[serial] {} input not flushed: {}", self.params.port, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_port_fails_to_connect() {
        let mut ch = SerialChannel::new(
            "com:/dev/does-not-exist:9600".into(),
            ComParams {
                port: "/dev/does-not-exist".into(),
                baud: 9600,
            },
        );
        assert!(ch.connect().is_err());
        assert!(!ch.is_open());
        let mut buf = Vec::new();
        assert!(ch.receive(&mut buf, Duration::from_millis(1)).is_err());
    }
}
