//! Engine module housing the tuner orchestration layer.
//!
//! `TunerHandle` ties the telemetry stream, the device settings and the
//! calibration controller together for the CLI and UI front ends.

pub mod core;

pub use core::TunerHandle;
