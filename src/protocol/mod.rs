// Protocol module - the device's newline-delimited ASCII wire contract
//
// This module provides three pieces:
// 1. LineAssembler: turns raw serial chunks into complete lines
// 2. Codec: classifies lines into TelemetryEvents and encodes DeviceCommands
// 3. TunableParam: the table of settings the firmware accepts

pub mod codec;
pub mod lines;
pub mod params;

pub use codec::{decode_line, encode_set_param, DeviceCommand, EventKind, TelemetryEvent};
pub use lines::LineAssembler;
pub use params::{ParamSpec, TunableParam};

/// Serial line speed expected by the firmware.
pub const BAUD_RATE: u32 = 115_200;
