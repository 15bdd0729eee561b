//! Configuration management for the tuner core
//!
//! Runtime configuration is loaded from a JSON file so link timing, the
//! recording window and the startup device settings can be adjusted without
//! recompiling. Every section and field is optional; anything missing falls
//! back to its default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::link::LinkSettings;
use crate::settings::DeviceSettings;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub calibration: CalibrationConfig,
    /// Settings pushed to the device on connect
    pub device: DeviceSettings,
}

/// Serial link parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub baud_rate: u32,
    /// Read loop sleep when no bytes are waiting
    pub poll_interval_ms: u64,
    /// Serial driver read timeout
    pub read_timeout_ms: u64,
    /// Pause between consecutive commands of an "apply all"
    pub command_spacing_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: crate::protocol::BAUD_RATE,
            poll_interval_ms: 5,
            read_timeout_ms: 100,
            command_spacing_ms: 20,
        }
    }
}

impl LinkConfig {
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            baud_rate: self.baud_rate,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            ..LinkSettings::default()
        }
    }

    pub fn command_spacing(&self) -> Duration {
        Duration::from_millis(self.command_spacing_ms)
    }
}

/// Calibration session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Length of one recording window
    pub recording_window_ms: u64,
    /// Points kept for the live pressure graph
    pub history_capacity: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            recording_window_ms: 3000,
            history_capacity: 400,
        }
    }
}

impl CalibrationConfig {
    pub fn recording_window(&self) -> Duration {
        Duration::from_millis(self.recording_window_ms)
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults (with a warning) when the
    /// file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load from the default location
    pub fn load() -> Self {
        Self::load_from_file("assets/tuner_config.json")
    }
}
