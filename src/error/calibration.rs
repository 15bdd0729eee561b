// Calibration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Calibration error code constants
///
/// Error code range: 2001-2004
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// Requested transition is not valid from the current session state
    pub const INVALID_TRANSITION: i32 = 2001;

    /// Analysis requested before any action was recorded
    pub const NO_SAMPLES: i32 = 2002;

    /// Calibration controller task has stopped
    pub const CONTROLLER_UNAVAILABLE: i32 = 2003;

    /// Device link is not open
    pub const LINK_DOWN: i32 = 2004;
}

/// Log a calibration error with structured context
///
/// Rejected transitions are expected during normal UI use, so they are
/// logged at warn level; everything else is an error.
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    if matches!(err, CalibrationError::InvalidTransition { .. }) {
        log::warn!(
            "Calibration transition rejected in {}: code={}, message={}",
            context,
            err.code(),
            err.message()
        );
        return;
    }
    error!(
        "Calibration error in {}: code={}, component=CalibrationSession, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
///
/// `InvalidTransition` is the "rejected no-op": the session state is left
/// exactly as it was.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Transition rejected (e.g. begin_recording while already recording)
    InvalidTransition {
        from: &'static str,
        attempted: &'static str,
    },

    /// No recorded actions to analyse
    NoSamples,

    /// Controller task is gone (shut down or panicked)
    ControllerUnavailable,

    /// Stream cannot start without an open device link
    LinkDown,
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::InvalidTransition { .. } => CalibrationErrorCodes::INVALID_TRANSITION,
            CalibrationError::NoSamples => CalibrationErrorCodes::NO_SAMPLES,
            CalibrationError::ControllerUnavailable => {
                CalibrationErrorCodes::CONTROLLER_UNAVAILABLE
            }
            CalibrationError::LinkDown => CalibrationErrorCodes::LINK_DOWN,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::InvalidTransition { from, attempted } => {
                format!("Cannot {} while {}", attempted, from)
            }
            CalibrationError::NoSamples => "No calibration data collected".to_string(),
            CalibrationError::ControllerUnavailable => {
                "Calibration controller is not running".to_string()
            }
            CalibrationError::LinkDown => "Connect to the device first".to_string(),
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}
