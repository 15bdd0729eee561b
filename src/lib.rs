// Sip-and-Puff Tuner Core
// Serial telemetry, device settings and threshold calibration for a
// sip-and-puff assistive controller

// Module declarations
pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod link;
pub mod protocol;
pub mod settings;

// Re-exports for convenience
pub use calibration::{
    derive_thresholds, ActionSampleSet, CalibrationAction, CalibrationHandle, SessionNotice,
    ThresholdSet, ThresholdSuggester, ThresholdSuggestion,
};
pub use config::AppConfig;
pub use engine::TunerHandle;
pub use error::{CalibrationError, ErrorCode, LinkError, ProtocolError};
pub use link::{LinkState, LinkStatus, TelemetryStream};
pub use protocol::{decode_line, encode_set_param, DeviceCommand, EventKind, TelemetryEvent};
pub use settings::DeviceSettings;
