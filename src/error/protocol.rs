// Protocol error types and constants
//
// Only outgoing commands can fail: malformed incoming telemetry is dropped by
// the decoder and never becomes an error value.

use crate::error::ErrorCode;
use std::fmt;

/// Protocol error code constants
///
/// Error code range: 3001-3002
pub struct ProtocolErrorCodes {}

impl ProtocolErrorCodes {
    /// Parameter key is not one of the tunable settings
    pub const UNKNOWN_PARAM: i32 = 3001;

    /// Parameter value outside its native range
    pub const PARAM_OUT_OF_RANGE: i32 = 3002;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    UnknownParam { key: String },
    ParamOutOfRange {
        key: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl ErrorCode for ProtocolError {
    fn code(&self) -> i32 {
        match self {
            ProtocolError::UnknownParam { .. } => ProtocolErrorCodes::UNKNOWN_PARAM,
            ProtocolError::ParamOutOfRange { .. } => ProtocolErrorCodes::PARAM_OUT_OF_RANGE,
        }
    }

    fn message(&self) -> String {
        match self {
            ProtocolError::UnknownParam { key } => format!("Unknown parameter key: {}", key),
            ProtocolError::ParamOutOfRange {
                key,
                value,
                min,
                max,
            } => format!("{} value {} out of range [{}, {}]", key, value, min, max),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProtocolError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ProtocolError {}
