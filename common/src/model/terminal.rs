use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Which wire protocol a terminal speaks, as chosen on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    Secure,
    DualChannel,
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "secure" | "sftp" => Ok(ProtocolKind::Secure),
            "dual-channel" | "dual_channel" | "ds2" | "ds2ftp" => Ok(ProtocolKind::DualChannel),
            other => Err(format!(
                "unknown protocol '{other}', expected 'secure' or 'dual-channel'"
            )),
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKind::Secure => f.write_str("secure"),
            ProtocolKind::DualChannel => f.write_str("dual-channel"),
        }
    }
}

/// Protocol plus the ports it needs, resolved at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Secure,
    DualChannel { control_port: u16, data_port: u16 },
}

impl Protocol {
    pub fn kind(&self) -> ProtocolKind {
        match self {
            Protocol::Secure => ProtocolKind::Secure,
            Protocol::DualChannel { .. } => ProtocolKind::DualChannel,
        }
    }
}

/// An endpoint. Constructing one never touches the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Terminal {
    host: String,
    port: u16,
    protocol: Protocol,
}

impl Terminal {
    pub fn secure(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: Protocol::Secure,
        }
    }

    /// Data goes to `data_port` (default `port`), control to `control_port`
    /// (default one above the data port).
    pub fn dual_channel(
        host: impl Into<String>,
        port: u16,
        control_port: Option<u16>,
        data_port: Option<u16>,
    ) -> Result<Self> {
        let data_port: u16 = data_port.unwrap_or(port);
        let control_port: u16 = match control_port {
            Some(control_port) => control_port,
            None => data_port.checked_add(1).ok_or_else(|| {
                Error::Configuration(format!(
                    "no default control port above data port {data_port}; pass one explicitly"
                ))
            })?,
        };

        Ok(Self {
            host: host.into(),
            port,
            protocol: Protocol::DualChannel {
                control_port,
                data_port,
            },
        })
    }

    pub fn new(
        kind: ProtocolKind,
        host: impl Into<String>,
        port: u16,
        control_port: Option<u16>,
        data_port: Option<u16>,
    ) -> Result<Self> {
        match kind {
            ProtocolKind::Secure => Ok(Self::secure(host, port)),
            ProtocolKind::DualChannel => Self::dual_channel(host, port, control_port, data_port),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn control_port(&self) -> Option<u16> {
        match self.protocol {
            Protocol::DualChannel { control_port, .. } => Some(control_port),
            Protocol::Secure => None,
        }
    }

    pub fn data_port(&self) -> Option<u16> {
        match self.protocol {
            Protocol::DualChannel { data_port, .. } => Some(data_port),
            Protocol::Secure => None,
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::Secure => write!(f, "{}:{} (secure)", self.host, self.port),
            Protocol::DualChannel {
                control_port,
                data_port,
            } => write!(
                f,
                "{} (dual-channel, control {control_port}, data {data_port})",
                self.host
            ),
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
