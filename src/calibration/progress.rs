// Session notices - the calibration log
//
// Every state change of the calibration session produces one notice. The
// controller broadcasts them so the UI can render a running log and enable or
// disable its buttons without polling.

use serde::{Deserialize, Serialize};

use crate::calibration::action::CalibrationAction;

/// Something that happened in the calibration session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionNotice {
    /// Device switched to the calibration stream
    StreamStarted,
    /// Calibration stream stopped; `discarded` names an interrupted recording
    StreamStopped {
        discarded: Option<CalibrationAction>,
    },
    /// Recording window opened
    RecordingStarted {
        action: CalibrationAction,
        window_ms: u64,
    },
    /// Recording window elapsed and its samples were stored
    RecordingCommitted {
        action: CalibrationAction,
        sample_count: usize,
    },
    /// Link dropped while streaming; `discarded` names an interrupted recording
    LinkLost {
        discarded: Option<CalibrationAction>,
    },
    /// All recorded actions were cleared
    SamplesCleared,
}

impl SessionNotice {
    /// One-line description for the calibration log
    pub fn describe(&self) -> String {
        match self {
            SessionNotice::StreamStarted => "Calibration stream started.".to_string(),
            SessionNotice::StreamStopped { discarded: None } => {
                "Calibration stream stopped.".to_string()
            }
            SessionNotice::StreamStopped {
                discarded: Some(action),
            } => format!(
                "Calibration stream stopped. Recording for {} discarded.",
                action
            ),
            SessionNotice::RecordingStarted { action, window_ms } => format!(
                "--- Recording for {} ({:.1}s) ---",
                action,
                *window_ms as f64 / 1000.0
            ),
            SessionNotice::RecordingCommitted {
                action,
                sample_count,
            } => format!("Collected {} samples for {}.", sample_count, action),
            SessionNotice::LinkLost { discarded: None } => {
                "Link lost; calibration stream stopped.".to_string()
            }
            SessionNotice::LinkLost {
                discarded: Some(action),
            } => format!(
                "Link lost; calibration stream stopped. Recording for {} discarded.",
                action
            ),
            SessionNotice::SamplesCleared => "Calibration data cleared.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(
            SessionNotice::RecordingCommitted {
                action: CalibrationAction::HardSip,
                sample_count: 0
            }
            .describe(),
            "Collected 0 samples for Hard Sip."
        );
        assert_eq!(
            SessionNotice::RecordingStarted {
                action: CalibrationAction::Neutral,
                window_ms: 3000
            }
            .describe(),
            "--- Recording for Neutral (3.0s) ---"
        );
        assert!(SessionNotice::StreamStopped {
            discarded: Some(CalibrationAction::SoftPuff)
        }
        .describe()
        .contains("Soft Puff discarded"));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_string(&SessionNotice::RecordingCommitted {
            action: CalibrationAction::SoftSip,
            sample_count: 12,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"event":"recording_committed","action":"Soft Sip","sample_count":12}"#
        );
    }
}
