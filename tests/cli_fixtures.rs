use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sipnpuff_cli"))
}

fn fixture_file(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

#[test]
fn suggest_fixture_outputs_thresholds() {
    let output = cli()
        .args(["suggest", "--samples", &fixture_file("sample_corpus.json")])
        .output()
        .expect("failed to run sipnpuff_cli suggest");
    assert!(
        output.status.success(),
        "CLI exited with {:?}",
        output.status.code()
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    let json: Value = serde_json::from_str(stdout.trim()).expect("suggestion JSON payload");
    let thresholds = &json["thresholds"];
    assert_eq!(thresholds["HST"], 255);
    assert_eq!(thresholds["NMIN"], 425);
    assert_eq!(thresholds["NMAX"], 520);
    assert_eq!(thresholds["SPT"], 605);
    assert_eq!(thresholds["HPT"], 705);
    assert_eq!(json["stats"]["Soft Sip"]["avg"], 310);
}

#[test]
fn suggest_uses_current_thresholds_without_evidence() {
    let mut corpus = tempfile::NamedTempFile::new().unwrap();
    write!(corpus, r#"{{"Neutral": [450, 460, 470]}}"#).unwrap();

    let output = cli()
        .args([
            "suggest",
            "--samples",
            corpus.path().to_str().unwrap(),
            "--current",
            "300,460,550,650,800",
        ])
        .output()
        .expect("failed to run sipnpuff_cli suggest");
    assert!(output.status.success());

    let json: Value = serde_json::from_slice(&output.stdout).expect("suggestion JSON payload");
    assert_eq!(json["thresholds"]["HST"], 300);
    assert_eq!(json["thresholds"]["HPT"], 800);
}

#[test]
fn suggest_rejects_malformed_current() {
    let output = cli()
        .args([
            "suggest",
            "--samples",
            &fixture_file("sample_corpus.json"),
            "--current",
            "300,460",
        ])
        .output()
        .expect("failed to run sipnpuff_cli suggest");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("expected five thresholds"), "{stderr}");
}

#[test]
fn suggest_rejects_empty_corpus() {
    let mut corpus = tempfile::NamedTempFile::new().unwrap();
    write!(corpus, "{{}}").unwrap();

    let output = cli()
        .args(["suggest", "--samples", corpus.path().to_str().unwrap()])
        .output()
        .expect("failed to run sipnpuff_cli suggest");
    assert!(!output.status.success());
}

#[test]
fn replay_fixture_summarises_telemetry() {
    let output = cli()
        .args([
            "replay",
            "--file",
            &fixture_file("calibration_session.log"),
            "--format",
            "json",
        ])
        .output()
        .expect("failed to run sipnpuff_cli replay");
    assert!(
        output.status.success(),
        "replay exited with {:?}: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );

    let json: Value = serde_json::from_slice(&output.stdout).expect("telemetry JSON payload");
    assert_eq!(json["lines_read"], 14);
    assert_eq!(json["malformed_lines"], 1);
    assert_eq!(json["observed_events"], 13);
    assert_eq!(json["events_by_kind"]["Pressure"], 4);
    assert_eq!(json["events_by_kind"]["CalibrationPressure"], 3);
    assert_eq!(json["pressure"]["min"], 498);
    assert_eq!(json["pressure"]["max"], 515);
    assert_eq!(json["calibration_pressure"]["last"], 350);
    assert_eq!(json["last_joystick"]["x"], 0);
    assert_eq!(json["device_errors"][0], "ERR:UNKNOWN_CMD");
    assert_eq!(json["device_commands"][0], "BOOT_OK");
    assert!(json["disconnect"]
        .as_str()
        .unwrap_or_default()
        .starts_with("I/O failure"));
}

#[test]
fn replay_missing_file_fails() {
    let output = cli()
        .args(["replay", "--file", &fixture_file("does_not_exist.log")])
        .output()
        .expect("failed to run sipnpuff_cli replay");
    assert_eq!(output.status.code(), Some(1));
}
