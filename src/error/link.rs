// Serial link error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Link error code constants
///
/// Error code range: 1001-1005
pub struct LinkErrorCodes {}

impl LinkErrorCodes {
    /// Port busy, missing or refused by the OS
    pub const OPEN_FAILED: i32 = 1001;

    /// Read or write failed while the link was open
    pub const IO_FAILURE: i32 = 1002;

    /// Operation requires an open link
    pub const NOT_CONNECTED: i32 = 1003;

    /// Connect called while a link is already open
    pub const ALREADY_CONNECTED: i32 = 1004;

    /// Mutex guarding the transport was poisoned
    pub const LOCK_POISONED: i32 = 1005;
}

/// Log a link error with structured context
pub fn log_link_error(err: &LinkError, context: &str) {
    error!(
        "Link error in {}: code={}, component=TelemetryStream, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Serial link errors
///
/// `OpenFailed` is surfaced to the caller of `connect`; `IoFailure` is
/// reported through the link status channel after an unsolicited disconnect.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// Opening the serial port failed
    OpenFailed { port: String, reason: String },

    /// Transport read/write failure mid-session
    IoFailure { reason: String },

    /// No link is open
    NotConnected,

    /// A link is already open
    AlreadyConnected,

    /// Lock poisoned for a link component
    LockPoisoned { component: String },
}

impl ErrorCode for LinkError {
    fn code(&self) -> i32 {
        match self {
            LinkError::OpenFailed { .. } => LinkErrorCodes::OPEN_FAILED,
            LinkError::IoFailure { .. } => LinkErrorCodes::IO_FAILURE,
            LinkError::NotConnected => LinkErrorCodes::NOT_CONNECTED,
            LinkError::AlreadyConnected => LinkErrorCodes::ALREADY_CONNECTED,
            LinkError::LockPoisoned { .. } => LinkErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            LinkError::OpenFailed { port, reason } => {
                format!("Failed to open serial port {}: {}", port, reason)
            }
            LinkError::IoFailure { reason } => format!("Serial I/O failure: {}", reason),
            LinkError::NotConnected => "Not connected. Call connect() first.".to_string(),
            LinkError::AlreadyConnected => {
                "Already connected. Call disconnect() first.".to_string()
            }
            LinkError::LockPoisoned { component } => {
                format!("Lock poisoned for component: {}", component)
            }
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LinkError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for LinkError {}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::IoFailure {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_codes() {
        assert_eq!(
            LinkError::OpenFailed {
                port: "/dev/ttyACM0".to_string(),
                reason: "busy".to_string()
            }
            .code(),
            LinkErrorCodes::OPEN_FAILED
        );
        assert_eq!(
            LinkError::IoFailure {
                reason: "x".to_string()
            }
            .code(),
            LinkErrorCodes::IO_FAILURE
        );
        assert_eq!(LinkError::NotConnected.code(), 1003);
        assert_eq!(LinkError::AlreadyConnected.code(), 1004);
        assert_eq!(
            LinkError::LockPoisoned {
                component: "transport".to_string()
            }
            .code(),
            1005
        );
    }

    #[test]
    fn test_open_failed_message_names_port() {
        let err = LinkError::OpenFailed {
            port: "COM7".to_string(),
            reason: "Access denied".to_string(),
        };
        assert_eq!(
            err.message(),
            "Failed to open serial port COM7: Access denied"
        );
        assert!(format!("{}", err).contains("1001"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "cable pulled");
        let err: LinkError = io.into();
        match err {
            LinkError::IoFailure { reason } => assert!(reason.contains("cable pulled")),
            other => panic!("Expected IoFailure, got {:?}", other),
        }
    }
}
