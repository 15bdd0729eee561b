use super::*;
use crate::calibration::{CalibrationAction, SessionState};
use crate::link::{ScriptHandle, ScriptedTransport};
use std::time::Duration;

impl TunerHandle {
    /// Handle with no pacing between commands and a short recording window
    pub fn new_test() -> Self {
        let mut config = AppConfig::default();
        config.link.command_spacing_ms = 0;
        config.link.poll_interval_ms = 1;
        config.calibration.recording_window_ms = 200;
        Self::from_config(config)
    }

    async fn connect_scripted(&self) -> ScriptHandle {
        let (transport, script) = ScriptedTransport::new();
        self.connect_with(Box::new(transport), "scripted")
            .await
            .unwrap();
        script
    }
}

#[tokio::test]
async fn test_connect_handshakes_then_pushes_settings() {
    let tuner = TunerHandle::new_test();
    let script = tuner.connect_scripted().await;

    let lines = script.written_lines();
    assert_eq!(lines.len(), 15);
    assert_eq!(lines[0], "H");
    assert_eq!(lines[1], "SET_HST:360");
    assert_eq!(lines[12], "SET_JRC:5");
    assert_eq!(lines[14], "SET_JPA:50");
    assert!(tuner.is_connected());
}

#[tokio::test]
async fn test_apply_all_requires_link() {
    let tuner = TunerHandle::new_test();
    assert_eq!(
        tuner.apply_all_settings().await,
        Err(LinkError::NotConnected)
    );
}

#[tokio::test]
async fn test_set_param_offline_updates_locally() {
    let tuner = TunerHandle::new_test();
    assert_eq!(tuner.set_param("JDZ", 40.0).await, Ok(TunableParam::Jdz));
    assert_eq!(tuner.settings().await.get(TunableParam::Jdz), 40.0);

    assert!(matches!(
        tuner.set_param("NOPE", 1.0).await,
        Err(ProtocolError::UnknownParam { .. })
    ));
    assert!(matches!(
        tuner.set_param("JRC", 9.0).await,
        Err(ProtocolError::ParamOutOfRange { .. })
    ));
}

#[tokio::test]
async fn test_set_param_online_sends_one_command() {
    let tuner = TunerHandle::new_test();
    let script = tuner.connect_scripted().await;

    tuner.set_param("JIR", 1.2).await.unwrap();
    assert_eq!(script.written_lines().last().unwrap(), "SET_JIR:12");
}

#[tokio::test]
async fn test_adopting_suggestion_pushes_all_settings() {
    let tuner = TunerHandle::new_test();
    let script = tuner.connect_scripted().await;

    let suggested = ThresholdSet::new(255, 425, 520, 605, 705);
    tuner.apply_suggested_thresholds(&suggested).await.unwrap();

    assert_eq!(tuner.current_thresholds().await, suggested);
    let lines = script.written_lines();
    assert_eq!(lines.len(), 29);
    assert_eq!(lines[15], "SET_HST:255");
    assert_eq!(lines[19], "SET_HPT:705");
}

#[tokio::test]
async fn test_disconnect_leaves_calibration_mode_first() {
    let tuner = TunerHandle::new_test();
    let script = tuner.connect_scripted().await;
    tuner.calibration().start_stream().await.unwrap();

    tuner.disconnect().await.unwrap();

    let lines = script.written_lines();
    assert_eq!(lines[lines.len() - 2], "START_CALIBRATION");
    assert_eq!(lines[lines.len() - 1], "STOP_CALIBRATION");
    assert!(!tuner.is_connected());
    let snapshot = tuner.calibration().snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Idle);
}

#[tokio::test]
async fn test_calibration_stream_requires_link() {
    let tuner = TunerHandle::new_test();
    assert_eq!(
        tuner.calibration().start_stream().await,
        Err(CalibrationError::LinkDown)
    );
}

#[tokio::test]
async fn test_recorded_telemetry_drives_suggestion() {
    let tuner = TunerHandle::new_test();
    let script = tuner.connect_scripted().await;
    tuner.calibration().start_stream().await.unwrap();

    tuner
        .calibration()
        .begin_recording(CalibrationAction::SoftSip)
        .await
        .unwrap();
    for value in [330, 340, 350] {
        script.feed_line(&format!("CALIB_P:{}", value));
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snapshot = tuner.calibration().snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Streaming);
    assert_eq!(
        snapshot.samples.get(CalibrationAction::SoftSip),
        Some(&[330, 340, 350][..])
    );

    let suggestion = tuner.suggest_thresholds().await.unwrap();
    assert_eq!(suggestion.thresholds.hst, 305);
    tuner.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unplugged_device_stops_calibration() {
    let tuner = TunerHandle::new_test();
    let script = tuner.connect_scripted().await;
    tuner.calibration().start_stream().await.unwrap();

    script.fail_reads("unplugged");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!tuner.is_connected());
    let snapshot = tuner.calibration().snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Idle);
}
