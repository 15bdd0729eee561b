// Error types for the sip-and-puff tuner
//
// This module defines custom error types for the serial link, the calibration
// session and the wire protocol, each carrying a numeric code so the UI layer
// can branch on failures without matching on message text.

mod calibration;
mod link;
mod protocol;

pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use link::{log_link_error, LinkError, LinkErrorCodes};
pub use protocol::{ProtocolError, ProtocolErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the collaborator boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
