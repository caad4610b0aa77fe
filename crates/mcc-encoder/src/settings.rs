// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel settings strings.
//!
//! Format: `protocol:transport:params`
//!
//! | transport | params              | example                          |
//! |-----------|---------------------|----------------------------------|
//! | `tcp`     | `host:port`         | `Mavlink:tcp:127.0.0.1:5760`     |
//! | `udp`     | `host:remote:local` | `Mavlink:udp:127.0.0.1:14550:`   |
//! | `com`     | `port:baud`         | `Internal:com:/dev/ttyUSB0:57600`|
//!
//! UDP ports may be left empty.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("settings must be protocol:transport:params, got '{0}'")]
    Format(String),
    #[error("unknown transport '{0}'")]
    UnknownTransport(String),
    #[error("invalid {transport} parameters '{params}'")]
    Params { transport: &'static str, params: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpParams {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpParams {
    pub host: String,
    pub remote_port: Option<u16>,
    pub local_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComParams {
    pub port: String,
    pub baud: u32,
}

/// Physical transport of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp(TcpParams),
    Udp(UdpParams),
    Com(ComParams),
}

impl Transport {
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::Tcp(_) => "tcp",
            Transport::Udp(_) => "udp",
            Transport::Com(_) => "com",
        }
    }

    fn params(&self) -> String {
        match self {
            Transport::Tcp(p) => format!("{}:{}", p.host, p.port),
            Transport::Udp(p) => format!(
                "{}:{}:{}",
                p.host,
                p.remote_port.map(|v| v.to_string()).unwrap_or_default(),
                p.local_port.map(|v| v.to_string()).unwrap_or_default()
            ),
            Transport::Com(p) => format!("{}:{}", p.port, p.baud),
        }
    }
}

/// Parsed settings string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetChannel {
    pub protocol: String,
    pub transport: Transport,
}

impl NetChannel {
    /// `transport:params`, unique per physical link.
    pub fn name(&self) -> String {
        format!("{}:{}", self.transport.kind(), self.transport.params())
    }
}

fn params_error(transport: &'static str, params: &str) -> SettingsError {
    SettingsError::Params {
        transport,
        params: params.to_string(),
    }
}

fn parse_port(s: &str) -> Option<Option<u16>> {
    if s.is_empty() {
        return Some(None);
    }
    s.parse().ok().map(Some)
}

impl FromStr for NetChannel {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut head = s.splitn(3, ':');
        let (Some(protocol), Some(transport), Some(params)) = (head.next(), head.next(), head.next())
        else {
            return Err(SettingsError::Format(s.to_string()));
        };
        if protocol.is_empty() {
            return Err(SettingsError::Format(s.to_string()));
        }
        let parts: Vec<&str> = params.split(':').collect();

        let transport = match transport {
            "tcp" => {
                let &[host, port] = parts.as_slice() else {
                    return Err(params_error("tcp", params));
                };
                let port = port.parse().map_err(|_| params_error("tcp", params))?;
                Transport::Tcp(TcpParams {
                    host: host.to_string(),
                    port,
                })
            }
            "udp" => {
                let &[host, remote, local] = parts.as_slice() else {
                    return Err(params_error("udp", params));
                };
                let remote_port = parse_port(remote).ok_or_else(|| params_error("udp", params))?;
                let local_port = parse_port(local).ok_or_else(|| params_error("udp", params))?;
                Transport::Udp(UdpParams {
                    host: host.to_string(),
                    remote_port,
                    local_port,
                })
            }
            "com" => {
                let &[port, baud] = parts.as_slice() else {
                    return Err(params_error("com", params));
                };
                let baud = baud.parse().map_err(|_| params_error("com", params))?;
                Transport::Com(ComParams {
                    port: port.to_string(),
                    baud,
                })
            }
            other => return Err(SettingsError::UnknownTransport(other.to_string())),
        };

        Ok(Self {
            protocol: protocol.to_string(),
            transport,
        })
    }
}

impl fmt::Display for NetChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.protocol,
            self.transport.kind(),
            self.transport.params()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp() {
        let c: NetChannel = "Mavlink:tcp:127.0.0.1:5760".parse().unwrap();
        assert_eq!(c.protocol, "Mavlink");
        assert_eq!(
            c.transport,
            Transport::Tcp(TcpParams {
                host: "127.0.0.1".into(),
                port: 5760
            })
        );
        assert_eq!(c.name(), "tcp:127.0.0.1:5760");
        assert_eq!(c.to_string(), "Mavlink:tcp:127.0.0.1:5760");
    }

    #[test]
    fn test_parse_udp_with_empty_ports() {
        let c: NetChannel = "Internal:udp:10.0.0.2:14550:".parse().unwrap();
        match &c.transport {
            Transport::Udp(p) => {
                assert_eq!(p.remote_port, Some(14550));
                assert_eq!(p.local_port, None);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(c.to_string(), "Internal:udp:10.0.0.2:14550:");
    }

    #[test]
    fn test_parse_com() {
        let c: NetChannel = "Photon:com:/dev/ttyUSB0:57600".parse().unwrap();
        assert_eq!(
            c.transport,
            Transport::Com(ComParams {
                port: "/dev/ttyUSB0".into(),
                baud: 57600
            })
        );
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            "Mavlink:tcp".parse::<NetChannel>(),
            Err(SettingsError::Format(_))
        ));
        assert!(matches!(
            "Mavlink:ws:host:1".parse::<NetChannel>(),
            Err(SettingsError::UnknownTransport(_))
        ));
        assert!(matches!(
            "Mavlink:tcp:host:1:2".parse::<NetChannel>(),
            Err(SettingsError::Params { .. })
        ));
        assert!(matches!(
            "Mavlink:tcp:host:notaport".parse::<NetChannel>(),
            Err(SettingsError::Params { .. })
        ));
        assert!(matches!(
            "Mavlink:udp:host:1".parse::<NetChannel>(),
            Err(SettingsError::Params { .. })
        ));
    }
}
