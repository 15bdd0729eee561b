//! Serial link to the controller board.
//!
//! The [`SerialTransport`] trait is the seam between the telemetry stream and
//! the byte pipe underneath it: [`SerialPortTransport`] talks to real
//! hardware, [`ScriptedTransport`] replays canned bytes for tests and the CLI.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use crate::protocol::DeviceCommand;

mod serial;
mod stream;
mod stub;
mod subscribers;

pub use serial::{list_ports, open_port, PortInfo, SerialPortTransport};
pub use stream::{LinkCounters, LinkSettings, TelemetryStream};
pub use stub::{ScriptHandle, ScriptedTransport};

/// Byte pipe the telemetry stream reads from and writes to.
///
/// Implementations do not need to be thread-safe: the stream serialises all
/// access behind its own lock.
pub trait SerialTransport: Send {
    /// Bytes that can be read without blocking
    fn bytes_available(&mut self) -> io::Result<usize>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Outbound side of the link as seen by the calibration session
pub trait CommandSink: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Fire-and-forget; failures surface through the link status channel
    fn send(&self, command: &DeviceCommand);
}

/// Connection state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Disconnected,
    Connected,
    /// Reserved for a future health check; never entered automatically
    Degraded,
}

/// Why the link went down
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// `disconnect()` was called
    Requested,
    /// The transport failed mid-session
    IoFailure(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Requested => f.write_str("disconnect requested"),
            DisconnectReason::IoFailure(reason) => write!(f, "I/O failure: {}", reason),
        }
    }
}

/// Link status change published on the status channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    Connected { port: String },
    Disconnected { reason: DisconnectReason },
}
