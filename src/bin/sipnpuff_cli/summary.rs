use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use sipnpuff_tuner::link::LinkCounters;
use sipnpuff_tuner::{EventKind, TelemetryEvent};
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};

#[derive(Default)]
pub struct TelemetryAggregator {
    total_events: usize,
    per_kind: BTreeMap<String, usize>,
    pressure: Option<PressureRange>,
    calibration_pressure: Option<PressureRange>,
    last_joystick: Option<JoystickReading>,
    acknowledgements: Vec<String>,
    device_errors: Vec<String>,
    device_commands: Vec<String>,
}

impl TelemetryAggregator {
    pub fn record(&mut self, event: TelemetryEvent) {
        self.total_events += 1;
        *self.per_kind.entry(kind_label(event.kind())).or_default() += 1;

        match event {
            TelemetryEvent::PressureSample(value) => extend(&mut self.pressure, value),
            TelemetryEvent::CalibrationPressureSample(value) => {
                extend(&mut self.calibration_pressure, value)
            }
            TelemetryEvent::JoystickVector { x, y } => {
                self.last_joystick = Some(JoystickReading { x, y })
            }
            TelemetryEvent::Acknowledgement(text) => self.acknowledgements.push(text),
            TelemetryEvent::ErrorReport(text) => self.device_errors.push(text),
            TelemetryEvent::OpaqueDeviceCommand(text) => self.device_commands.push(text),
        }
    }

    pub fn into_report(
        self,
        counters: LinkCounters,
        disconnect: Option<String>,
    ) -> TelemetryReport {
        TelemetryReport {
            observed_events: self.total_events,
            lines_read: counters.lines_read,
            malformed_lines: counters.malformed_lines,
            overlong_lines: counters.overlong_lines,
            events_by_kind: self.per_kind,
            pressure: self.pressure,
            calibration_pressure: self.calibration_pressure,
            last_joystick: self.last_joystick,
            acknowledgements: self.acknowledgements,
            device_errors: self.device_errors,
            device_commands: self.device_commands,
            disconnect,
        }
    }
}

fn extend(range: &mut Option<PressureRange>, value: u16) {
    match range {
        Some(range) => {
            range.min = range.min.min(value);
            range.max = range.max.max(value);
            range.last = value;
            range.count += 1;
        }
        None => {
            *range = Some(PressureRange {
                min: value,
                max: value,
                last: value,
                count: 1,
            })
        }
    }
}

fn kind_label(kind: EventKind) -> String {
    format!("{kind:?}")
}

pub fn drain_events(
    rx: &mut UnboundedReceiver<TelemetryEvent>,
    aggregator: &mut TelemetryAggregator,
) {
    loop {
        match rx.try_recv() {
            Ok(event) => aggregator.record(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TelemetryReport {
    pub observed_events: usize,
    pub lines_read: u64,
    pub malformed_lines: u64,
    pub overlong_lines: u64,
    pub events_by_kind: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<PressureRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_pressure: Option<PressureRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_joystick: Option<JoystickReading>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub acknowledgements: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub device_errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub device_commands: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnect: Option<String>,
}

impl TelemetryReport {
    pub fn print_json(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serializing telemetry report")?;
        println!("{json}");
        Ok(())
    }

    pub fn print_table(&self) {
        println!("Telemetry events observed : {}", self.observed_events);
        println!(
            "Lines read               : {} (malformed {}, over-long {})",
            self.lines_read, self.malformed_lines, self.overlong_lines
        );
        for (kind, count) in &self.events_by_kind {
            println!("  - {kind}: {count}");
        }

        for (label, range) in [
            ("Pressure", &self.pressure),
            ("Calibration pressure", &self.calibration_pressure),
        ] {
            match range {
                Some(range) => println!(
                    "{label:<25}: min {} / max {} / last {} over {} samples",
                    range.min, range.max, range.last, range.count
                ),
                None => println!("{label:<25}: n/a"),
            }
        }

        if let Some(joystick) = &self.last_joystick {
            println!(
                "Last joystick            : x={} y={}",
                joystick.x, joystick.y
            );
        }
        for ack in &self.acknowledgements {
            println!("ACK                      : {ack}");
        }
        for err in &self.device_errors {
            println!("ERR                      : {err}");
        }
        for command in &self.device_commands {
            println!("CMD                      : {command}");
        }
        if let Some(reason) = &self.disconnect {
            println!("Link closed              : {reason}");
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PressureRange {
    pub min: u16,
    pub max: u16,
    pub last: u16,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct JoystickReading {
    pub x: i16,
    pub y: i16,
}
