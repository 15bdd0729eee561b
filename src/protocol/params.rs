//! Tunable device parameters and their native ranges.
//!
//! The firmware only understands integers, so the two parameters expressed in
//! seconds travel as integer tenths.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// One of the settings accepted by the `SET_<KEY>:<value>` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TunableParam {
    /// Hard-sip threshold
    Hst,
    /// Neutral band lower bound
    Nmin,
    /// Neutral band upper bound
    Nmax,
    /// Soft-puff threshold
    Spt,
    /// Hard-puff threshold
    Hpt,
    /// Joystick dead zone (%)
    Jdz,
    /// Cursor speed
    Csp,
    /// Sip action delay (ms)
    Sad,
    /// Joystick movement threshold (%)
    Jmt,
    /// Joystick full-range (%)
    Jfr,
    /// Joystick center bias (%)
    Jcb,
    /// Joystick re-center time (s)
    Jrc,
    /// Joystick input ramp (s)
    Jir,
    /// Joystick acceleration (%)
    Jpa,
}

/// Static description of a parameter: native range, default and wire scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub key: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    /// Multiplier applied before the value goes on the wire
    pub wire_scale: f64,
}

static KEY_LOOKUP: Lazy<HashMap<&'static str, TunableParam>> = Lazy::new(|| {
    TunableParam::ALL
        .iter()
        .map(|param| (param.key(), *param))
        .collect()
});

impl TunableParam {
    /// All parameters in the order the device expects them during "apply all".
    pub const ALL: [TunableParam; 14] = [
        TunableParam::Hst,
        TunableParam::Nmin,
        TunableParam::Nmax,
        TunableParam::Spt,
        TunableParam::Hpt,
        TunableParam::Jdz,
        TunableParam::Csp,
        TunableParam::Sad,
        TunableParam::Jmt,
        TunableParam::Jfr,
        TunableParam::Jcb,
        TunableParam::Jrc,
        TunableParam::Jir,
        TunableParam::Jpa,
    ];

    /// The five pressure thresholds, low to high.
    pub const THRESHOLDS: [TunableParam; 5] = [
        TunableParam::Hst,
        TunableParam::Nmin,
        TunableParam::Nmax,
        TunableParam::Spt,
        TunableParam::Hpt,
    ];

    pub fn spec(&self) -> ParamSpec {
        let (key, min, max, default, wire_scale) = match self {
            TunableParam::Hst => ("HST", 0.0, 1023.0, 360.0, 1.0),
            TunableParam::Nmin => ("NMIN", 0.0, 1023.0, 460.0, 1.0),
            TunableParam::Nmax => ("NMAX", 0.0, 1023.0, 550.0, 1.0),
            TunableParam::Spt => ("SPT", 0.0, 1023.0, 600.0, 1.0),
            TunableParam::Hpt => ("HPT", 0.0, 1023.0, 700.0, 1.0),
            TunableParam::Jdz => ("JDZ", 0.0, 100.0, 20.0, 1.0),
            TunableParam::Csp => ("CSP", 1.0, 50.0, 10.0, 1.0),
            TunableParam::Sad => ("SAD", 0.0, 1000.0, 150.0, 1.0),
            TunableParam::Jmt => ("JMT", 0.0, 100.0, 5.0, 1.0),
            TunableParam::Jfr => ("JFR", 0.0, 100.0, 100.0, 1.0),
            TunableParam::Jcb => ("JCB", 0.0, 100.0, 20.0, 1.0),
            TunableParam::Jrc => ("JRC", 0.0, 5.0, 0.5, 10.0),
            TunableParam::Jir => ("JIR", 0.0, 2.0, 0.3, 10.0),
            TunableParam::Jpa => ("JPA", 0.0, 100.0, 50.0, 1.0),
        };
        ParamSpec {
            key,
            min,
            max,
            default,
            wire_scale,
        }
    }

    /// Upper-case wire key, e.g. `"NMIN"`.
    pub fn key(&self) -> &'static str {
        self.spec().key
    }

    /// Look up a parameter by its wire key (case-sensitive).
    pub fn from_key(key: &str) -> Result<Self, ProtocolError> {
        KEY_LOOKUP
            .get(key)
            .copied()
            .ok_or_else(|| ProtocolError::UnknownParam {
                key: key.to_string(),
            })
    }

    /// Whether the value is expressed in seconds and scaled on the wire.
    pub fn is_scaled(&self) -> bool {
        self.spec().wire_scale != 1.0
    }

    /// Validate `value` against the native range and convert it to the
    /// integer sent on the wire (tenths for scaled parameters).
    pub fn wire_value(&self, value: f64) -> Result<i32, ProtocolError> {
        let spec = self.spec();
        if !value.is_finite() || value < spec.min || value > spec.max {
            return Err(ProtocolError::ParamOutOfRange {
                key: spec.key,
                value,
                min: spec.min,
                max: spec.max,
            });
        }
        Ok((value * spec.wire_scale).round() as i32)
    }
}

impl fmt::Display for TunableParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
