//! Line codec for the device's text protocol.
//!
//! Incoming lines are classified by case-sensitive prefix. Numeric payloads
//! that fail to parse are dropped silently: the firmware emits partial lines
//! after resets and while the USB CDC buffer overflows, and none of that is
//! worth surfacing.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::protocol::params::TunableParam;

const CALIB_PRESSURE_PREFIX: &str = "CALIB_P:";
const PRESSURE_PREFIX: &str = "P:";
const JOYSTICK_PREFIX: &str = "JOY:";
const ACK_PREFIXES: [&str; 2] = ["ACK:", "CMD_RECV:"];
const ERROR_PREFIX: &str = "ERR:";

/// One decoded line of device telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Raw pressure reading in normal mode (`P:<int>`)
    PressureSample(u16),
    /// Raw pressure reading while the calibration stream is on (`CALIB_P:<int>`)
    CalibrationPressureSample(u16),
    /// Joystick deflection centred at zero (`JOY:<x>,<y>`)
    JoystickVector { x: i16, y: i16 },
    /// `ACK:` / `CMD_RECV:` line, kept verbatim
    Acknowledgement(String),
    /// `ERR:` line, kept verbatim
    ErrorReport(String),
    /// Anything else; forwarded untouched to the cursor-injection layer
    OpaqueDeviceCommand(String),
}

/// Subscription key for [`TelemetryEvent`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Pressure,
    CalibrationPressure,
    Joystick,
    Acknowledgement,
    ErrorReport,
    DeviceCommand,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Pressure,
        EventKind::CalibrationPressure,
        EventKind::Joystick,
        EventKind::Acknowledgement,
        EventKind::ErrorReport,
        EventKind::DeviceCommand,
    ];
}

impl TelemetryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TelemetryEvent::PressureSample(_) => EventKind::Pressure,
            TelemetryEvent::CalibrationPressureSample(_) => EventKind::CalibrationPressure,
            TelemetryEvent::JoystickVector { .. } => EventKind::Joystick,
            TelemetryEvent::Acknowledgement(_) => EventKind::Acknowledgement,
            TelemetryEvent::ErrorReport(_) => EventKind::ErrorReport,
            TelemetryEvent::OpaqueDeviceCommand(_) => EventKind::DeviceCommand,
        }
    }
}

/// Decode a single line into an event.
///
/// Returns `None` for blank lines and for known prefixes whose payload does
/// not parse.
pub fn decode_line(line: &str) -> Option<TelemetryEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(payload) = line.strip_prefix(CALIB_PRESSURE_PREFIX) {
        return parse_field::<u16>(payload).map(TelemetryEvent::CalibrationPressureSample);
    }
    if let Some(payload) = line.strip_prefix(PRESSURE_PREFIX) {
        return parse_field::<u16>(payload).map(TelemetryEvent::PressureSample);
    }
    if let Some(payload) = line.strip_prefix(JOYSTICK_PREFIX) {
        return parse_joystick(payload);
    }
    if ACK_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
        return Some(TelemetryEvent::Acknowledgement(line.to_string()));
    }
    if line.starts_with(ERROR_PREFIX) {
        return Some(TelemetryEvent::ErrorReport(line.to_string()));
    }

    Some(TelemetryEvent::OpaqueDeviceCommand(line.to_string()))
}

/// The payload runs up to the next `:` if the firmware appended more fields.
fn parse_field<T: std::str::FromStr>(payload: &str) -> Option<T> {
    payload.split(':').next()?.trim().parse().ok()
}

fn parse_joystick(payload: &str) -> Option<TelemetryEvent> {
    let payload = payload.split(':').next()?;
    let mut parts = payload.split(',');
    let x = parts.next()?.trim().parse().ok()?;
    let y = parts.next()?.trim().parse().ok()?;
    Some(TelemetryEvent::JoystickVector { x, y })
}

/// Outgoing command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    /// Sent once right after the port opens
    Handshake,
    StartCalibration,
    StopCalibration,
    /// Already-scaled integer wire value
    SetParam {
        param: TunableParam,
        wire_value: i32,
    },
}

impl DeviceCommand {
    /// Build a `SET_` command from a native value, validating and scaling it.
    pub fn set_param(param: TunableParam, value: f64) -> Result<Self, ProtocolError> {
        Ok(DeviceCommand::SetParam {
            param,
            wire_value: param.wire_value(value)?,
        })
    }

    /// Newline-terminated wire text.
    pub fn encode(&self) -> String {
        match self {
            DeviceCommand::Handshake => "H\n".to_string(),
            DeviceCommand::StartCalibration => "START_CALIBRATION\n".to_string(),
            DeviceCommand::StopCalibration => "STOP_CALIBRATION\n".to_string(),
            DeviceCommand::SetParam { param, wire_value } => {
                format!("SET_{}:{}\n", param.key(), wire_value)
            }
        }
    }
}

/// Encode `SET_<KEY>:<value>` from a wire key and native value.
pub fn encode_set_param(key: &str, value: f64) -> Result<String, ProtocolError> {
    let param = TunableParam::from_key(key)?;
    Ok(DeviceCommand::set_param(param, value)?.encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_calibration_sample() {
        assert_eq!(
            decode_line("CALIB_P:512"),
            Some(TelemetryEvent::CalibrationPressureSample(512))
        );
        assert_eq!(
            decode_line("  CALIB_P: 7 \r"),
            Some(TelemetryEvent::CalibrationPressureSample(7))
        );
    }

    #[test]
    fn test_calib_prefix_takes_precedence_over_pressure() {
        // "CALIB_P:" must never fall through to the "P:" branch
        assert_eq!(decode_line("CALIB_P:abc"), None);
    }

    #[test]
    fn test_decode_pressure_sample() {
        assert_eq!(
            decode_line("P:430"),
            Some(TelemetryEvent::PressureSample(430))
        );
        assert_eq!(decode_line("P:"), None);
        assert_eq!(decode_line("P:-4"), None);
        assert_eq!(decode_line("P:70000"), None);
    }

    #[test]
    fn test_extra_fields_after_payload_are_ignored() {
        assert_eq!(
            decode_line("CALIB_P:300:junk"),
            Some(TelemetryEvent::CalibrationPressureSample(300))
        );
    }

    #[test]
    fn test_decode_joystick() {
        assert_eq!(
            decode_line("JOY:-12,40"),
            Some(TelemetryEvent::JoystickVector { x: -12, y: 40 })
        );
        assert_eq!(
            decode_line("JOY:1,2,3"),
            Some(TelemetryEvent::JoystickVector { x: 1, y: 2 })
        );
        assert_eq!(decode_line("JOY:5"), None);
        assert_eq!(decode_line("JOY:a,b"), None);
        assert_eq!(decode_line("JOY:"), None);
    }

    #[test]
    fn test_decode_acknowledgements_keep_full_line() {
        assert_eq!(
            decode_line("ACK:SET_HST"),
            Some(TelemetryEvent::Acknowledgement("ACK:SET_HST".to_string()))
        );
        assert_eq!(
            decode_line("CMD_RECV:H"),
            Some(TelemetryEvent::Acknowledgement("CMD_RECV:H".to_string()))
        );
        assert_eq!(
            decode_line("ERR:bad value"),
            Some(TelemetryEvent::ErrorReport("ERR:bad value".to_string()))
        );
    }

    #[test]
    fn test_decode_opaque_and_blank() {
        assert_eq!(
            decode_line("MOVE,3,-2"),
            Some(TelemetryEvent::OpaqueDeviceCommand("MOVE,3,-2".to_string()))
        );
        // prefixes are case-sensitive
        assert_eq!(
            decode_line("p:100"),
            Some(TelemetryEvent::OpaqueDeviceCommand("p:100".to_string()))
        );
        assert_eq!(decode_line(""), None);
        assert_eq!(decode_line("   \r"), None);
    }

    #[test]
    fn test_decode_never_panics_on_noise() {
        let noise = [
            "CALIB_P:",
            "CALIB_P::::",
            "JOY:,",
            "JOY:999999,1",
            "P:1e3",
            "\u{fffd}\u{fffd}",
            "ACK",
            ":",
        ];
        for line in noise {
            let _ = decode_line(line);
        }
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(
            TelemetryEvent::CalibrationPressureSample(1).kind(),
            EventKind::CalibrationPressure
        );
        assert_eq!(
            TelemetryEvent::OpaqueDeviceCommand(String::new()).kind(),
            EventKind::DeviceCommand
        );
    }

    #[test]
    fn test_encode_commands() {
        assert_eq!(DeviceCommand::Handshake.encode(), "H\n");
        assert_eq!(
            DeviceCommand::StartCalibration.encode(),
            "START_CALIBRATION\n"
        );
        assert_eq!(
            DeviceCommand::StopCalibration.encode(),
            "STOP_CALIBRATION\n"
        );
    }

    #[test]
    fn test_encode_set_param() {
        assert_eq!(encode_set_param("JRC", 0.5).unwrap(), "SET_JRC:5\n");
        assert_eq!(encode_set_param("CSP", 10.0).unwrap(), "SET_CSP:10\n");
        assert_eq!(encode_set_param("NMIN", 425.0).unwrap(), "SET_NMIN:425\n");
        assert!(matches!(
            encode_set_param("FOO", 1.0),
            Err(ProtocolError::UnknownParam { .. })
        ));
        assert!(matches!(
            encode_set_param("SAD", 1001.0),
            Err(ProtocolError::ParamOutOfRange { key: "SAD", .. })
        ));
    }
}
