//! Integration tests for the calibration workflow
//!
//! A `TunerHandle` is connected to a scripted device and walked through a
//! full calibration: stream start, one recording per action, suggestion,
//! and adoption of the suggested thresholds.

use std::time::Duration;

use sipnpuff_tuner::link::{ScriptHandle, ScriptedTransport};
use sipnpuff_tuner::{
    AppConfig, CalibrationAction, CalibrationError, SessionNotice, ThresholdSet, TunerHandle,
};
use tokio::sync::broadcast;

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.link.command_spacing_ms = 0;
    config.link.poll_interval_ms = 1;
    config.calibration.recording_window_ms = 300;
    config
}

async fn connect(tuner: &TunerHandle) -> ScriptHandle {
    let (transport, script) = ScriptedTransport::new();
    tuner
        .connect_with(Box::new(transport), "scripted")
        .await
        .expect("scripted connect");
    script
}

async fn wait_for_commit(
    notices: &mut broadcast::Receiver<SessionNotice>,
    action: CalibrationAction,
) -> usize {
    loop {
        let notice = tokio::time::timeout(Duration::from_secs(3), notices.recv())
            .await
            .expect("notice within timeout")
            .expect("notice channel open");
        if let SessionNotice::RecordingCommitted {
            action: done,
            sample_count,
        } = notice
        {
            assert_eq!(done, action);
            return sample_count;
        }
    }
}

async fn record(
    tuner: &TunerHandle,
    script: &ScriptHandle,
    notices: &mut broadcast::Receiver<SessionNotice>,
    action: CalibrationAction,
    values: &[u16],
) -> usize {
    tuner.calibration().begin_recording(action).await.unwrap();
    for value in values {
        script.feed_line(&format!("CALIB_P:{value}"));
    }
    wait_for_commit(notices, action).await
}

#[tokio::test]
async fn test_full_calibration_workflow() {
    let tuner = TunerHandle::from_config(test_config());
    let script = connect(&tuner).await;
    let mut notices = tuner.calibration().subscribe_notices();

    tuner.calibration().start_stream().await.unwrap();
    assert_eq!(script.written_lines().last().unwrap(), "START_CALIBRATION");

    let corpus: [(CalibrationAction, &[u16]); 5] = [
        (CalibrationAction::Neutral, &[450, 460, 470]),
        (CalibrationAction::SoftSip, &[300, 310, 320]),
        (CalibrationAction::HardSip, &[250, 260]),
        (CalibrationAction::SoftPuff, &[600, 610]),
        (CalibrationAction::HardPuff, &[700, 710]),
    ];
    for (action, values) in corpus {
        let count = record(&tuner, &script, &mut notices, action, values).await;
        assert_eq!(count, values.len(), "samples for {action}");
    }

    tuner.calibration().stop_stream().await.unwrap();
    let suggestion = tuner.suggest_thresholds().await.unwrap();
    assert_eq!(
        suggestion.thresholds,
        ThresholdSet::new(255, 425, 520, 605, 705)
    );
    assert_eq!(suggestion.stats.len(), 5);

    tuner
        .apply_suggested_thresholds(&suggestion.thresholds)
        .await
        .unwrap();
    assert_eq!(tuner.current_thresholds().await, suggestion.thresholds);
    let lines = script.written_lines();
    assert!(lines.contains(&"SET_HST:255".to_string()));
    assert!(lines.contains(&"SET_HPT:705".to_string()));

    tuner.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rerecording_replaces_previous_samples() {
    let tuner = TunerHandle::from_config(test_config());
    let script = connect(&tuner).await;
    let mut notices = tuner.calibration().subscribe_notices();
    tuner.calibration().start_stream().await.unwrap();

    record(
        &tuner,
        &script,
        &mut notices,
        CalibrationAction::SoftSip,
        &[100, 110],
    )
    .await;
    record(
        &tuner,
        &script,
        &mut notices,
        CalibrationAction::SoftSip,
        &[330, 340, 350],
    )
    .await;

    let suggestion = tuner.suggest_thresholds().await.unwrap();
    assert_eq!(suggestion.stats[&CalibrationAction::SoftSip].count, 3);
    assert_eq!(suggestion.thresholds.hst, 305);

    tuner.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pressure_telemetry_is_not_recorded() {
    let tuner = TunerHandle::from_config(test_config());
    let script = connect(&tuner).await;
    let mut notices = tuner.calibration().subscribe_notices();
    tuner.calibration().start_stream().await.unwrap();

    tuner
        .calibration()
        .begin_recording(CalibrationAction::Neutral)
        .await
        .unwrap();
    script.feed_line("P:480");
    script.feed_line("JOY:3,3");
    assert_eq!(
        wait_for_commit(&mut notices, CalibrationAction::Neutral).await,
        0
    );

    tuner.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stream_requires_connection() {
    let tuner = TunerHandle::from_config(test_config());
    assert_eq!(
        tuner.calibration().start_stream().await,
        Err(CalibrationError::LinkDown)
    );
    assert_eq!(
        tuner.suggest_thresholds().await.unwrap_err(),
        CalibrationError::NoSamples
    );
}

#[tokio::test]
async fn test_device_loss_mid_recording() {
    let tuner = TunerHandle::from_config(test_config());
    let script = connect(&tuner).await;
    let mut notices = tuner.calibration().subscribe_notices();
    tuner.calibration().start_stream().await.unwrap();
    tuner
        .calibration()
        .begin_recording(CalibrationAction::HardPuff)
        .await
        .unwrap();

    script.fail_reads("device unplugged");
    let lost = loop {
        let notice = tokio::time::timeout(Duration::from_secs(3), notices.recv())
            .await
            .expect("notice within timeout")
            .expect("notice channel open");
        if matches!(notice, SessionNotice::LinkLost { .. }) {
            break notice;
        }
    };
    assert_eq!(
        lost,
        SessionNotice::LinkLost {
            discarded: Some(CalibrationAction::HardPuff)
        }
    );
    assert!(!tuner.is_connected());
    assert!(!tuner
        .calibration()
        .snapshot()
        .await
        .unwrap()
        .state
        .is_streaming());
}
