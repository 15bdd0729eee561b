//! TunerHandle: orchestration layer over the link, settings and calibration.
//!
//! The handle owns the telemetry stream, the current device settings and the
//! calibration controller, and wires them together: connecting pushes the
//! settings, disconnecting stops an active calibration stream first, and
//! accepted threshold suggestions flow back into the settings.

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::calibration::{
    spawn_controller, CalibrationHandle, CalibrationSession, ThresholdSet, ThresholdSuggestion,
};
use crate::config::AppConfig;
use crate::error::{log_link_error, CalibrationError, LinkError, ProtocolError};
use crate::link::{CommandSink, SerialTransport, TelemetryStream};
use crate::protocol::{DeviceCommand, EventKind, TunableParam};
use crate::settings::DeviceSettings;

/// Entry point used by the CLI and any UI front end.
///
/// Must be created inside a tokio runtime: the calibration controller is
/// spawned on it.
pub struct TunerHandle {
    config: AppConfig,
    stream: Arc<TelemetryStream>,
    settings: RwLock<DeviceSettings>,
    calibration: CalibrationHandle,
    controller_task: JoinHandle<()>,
}

impl TunerHandle {
    /// Create a handle from `assets/tuner_config.json` (or defaults)
    pub fn new() -> Self {
        Self::from_config(AppConfig::load())
    }

    pub fn from_config(config: AppConfig) -> Self {
        let stream = Arc::new(TelemetryStream::new(config.link.link_settings()));

        let sink: Arc<dyn CommandSink> = stream.clone();
        let session = CalibrationSession::with_settings(
            sink,
            config.calibration.recording_window(),
            config.calibration.history_capacity,
        );
        let (calibration, controller_task) = spawn_controller(
            session,
            stream.subscribe(EventKind::CalibrationPressure),
            stream.subscribe_status(),
        );

        Self {
            settings: RwLock::new(config.device.clone()),
            config,
            stream,
            calibration,
            controller_task,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Telemetry stream, for subscriptions and link state
    pub fn stream(&self) -> &TelemetryStream {
        &self.stream
    }

    pub fn calibration(&self) -> &CalibrationHandle {
        &self.calibration
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_connected()
    }

    // ========================================================================
    // LINK LIFECYCLE
    // ========================================================================

    /// Open `port`, handshake, and push every setting
    ///
    /// # Errors
    /// - `AlreadyConnected` / `OpenFailed` from the stream
    /// - `IoFailure` if the settings push fails part way
    pub async fn connect(&self, port: &str) -> Result<(), LinkError> {
        self.stream.connect(port)?;
        self.apply_all_settings().await.map(|_| ())
    }

    /// Same as [`connect`](Self::connect) over an already open transport
    pub async fn connect_with(
        &self,
        transport: Box<dyn SerialTransport>,
        label: &str,
    ) -> Result<(), LinkError> {
        self.stream.connect_with(transport, label)?;
        self.apply_all_settings().await.map(|_| ())
    }

    /// Close the link, leaving calibration mode on the device first
    pub async fn disconnect(&self) -> Result<(), LinkError> {
        match self.calibration.snapshot().await {
            Ok(snapshot) if snapshot.state.is_streaming() => {
                if let Err(err) = self.calibration.stop_stream().await {
                    warn!("[TunerHandle] Could not stop calibration stream: {}", err);
                }
            }
            Ok(_) => {}
            Err(err) => warn!("[TunerHandle] Calibration state unavailable: {}", err),
        }
        self.stream.disconnect()
    }

    /// Stop the calibration controller and close the link
    pub async fn shutdown(self) -> Result<(), LinkError> {
        let result = self.disconnect().await;
        if self.calibration.shutdown().await.is_ok() {
            let _ = self.controller_task.await;
        }
        result
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    /// Send every setting in device order, pausing between commands
    ///
    /// # Returns
    /// Number of commands sent
    ///
    /// # Errors
    /// - `NotConnected` when no link is open
    /// - `IoFailure` when a write fails (remaining commands are not sent)
    pub async fn apply_all_settings(&self) -> Result<usize, LinkError> {
        if !self.stream.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let commands = self.settings.read().await.commands();
        let spacing = self.config.link.command_spacing();

        for command in &commands {
            self.stream
                .send(command)
                .inspect_err(|err| log_link_error(err, "apply_all_settings"))?;
            tokio::time::sleep(spacing).await;
        }

        info!("[TunerHandle] Applied {} settings", commands.len());
        Ok(commands.len())
    }

    /// Update one setting and, when connected, send it to the device
    ///
    /// Link failures are logged and reported through the status channel;
    /// the local value is updated either way.
    pub async fn set_param(&self, key: &str, value: f64) -> Result<TunableParam, ProtocolError> {
        let param = self.settings.write().await.set_by_key(key, value)?;

        if self.stream.is_connected() {
            let stored = self.settings.read().await.get(param);
            let command = DeviceCommand::set_param(param, stored)?;
            if let Err(err) = self.stream.send(&command) {
                log_link_error(&err, "set_param");
            }
        }
        Ok(param)
    }

    pub async fn settings(&self) -> DeviceSettings {
        self.settings.read().await.clone()
    }

    /// Replace all settings, pushing them when connected
    pub async fn load_settings(&self, settings: DeviceSettings) {
        *self.settings.write().await = settings;
        self.push_if_connected().await;
    }

    pub async fn current_thresholds(&self) -> ThresholdSet {
        self.settings.read().await.thresholds()
    }

    /// Adopt `thresholds` and, when connected, push all settings
    pub async fn apply_suggested_thresholds(
        &self,
        thresholds: &ThresholdSet,
    ) -> Result<(), ProtocolError> {
        self.settings.write().await.set_thresholds(thresholds)?;
        info!(
            "[TunerHandle] Adopted thresholds {:?}",
            thresholds.as_array()
        );
        self.push_if_connected().await;
        Ok(())
    }

    // ========================================================================
    // CALIBRATION
    // ========================================================================

    /// Suggest thresholds from the recordings so far, starting from the
    /// current settings with factory thresholds as the fallback band
    pub async fn suggest_thresholds(&self) -> Result<ThresholdSuggestion, CalibrationError> {
        let current = self.current_thresholds().await;
        let defaults = DeviceSettings::factory().thresholds();
        self.calibration.suggest_thresholds(current, defaults).await
    }

    async fn push_if_connected(&self) {
        if !self.stream.is_connected() {
            return;
        }
        if let Err(err) = self.apply_all_settings().await {
            log_link_error(&err, "push_settings");
        }
    }
}

// ========================================================================
// TEST HELPERS
// ========================================================================

#[cfg(test)]
mod tests;
