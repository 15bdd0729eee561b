// Calibration module - recording pressure samples and suggesting thresholds
//
// This module provides the calibration workflow:
// 1. CalibrationSession: stream/recording state machine fed with samples
// 2. CalibrationController: async task owning the session and its timer
// 3. ThresholdSuggester: turns recorded samples into a ThresholdSet
//
// The calibration workflow:
// 1. Start the calibration stream on the device
// 2. Record each action for one window (neutral, soft/hard sip, soft/hard puff)
// 3. Ask for suggested thresholds and adopt them

pub mod action;
pub mod controller;
pub mod history;
pub mod progress;
pub mod session;
pub mod suggest;
pub mod thresholds;

pub use action::{ActionSampleSet, CalibrationAction};
pub use controller::{spawn_controller, CalibrationHandle};
pub use history::PressureHistory;
pub use progress::SessionNotice;
pub use session::{
    CalibrationSession, SessionSnapshot, SessionState, DEFAULT_HISTORY_CAPACITY,
    DEFAULT_RECORDING_WINDOW,
};
pub use suggest::{
    derive_thresholds, ActionStats, NeutralBand, SuggestionNote, ThresholdSuggester,
    ThresholdSuggestion, KNOWN_NEUTRAL_BAND,
};
pub use thresholds::{ThresholdSet, MIN_ZONE_SEPARATION, PRESSURE_MAX};
