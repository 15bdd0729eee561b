// DeviceSettings - the full set of tunable values pushed to the device
//
// Values are kept in native units (seconds for JRC/JIR) and converted to wire
// integers only when commands are built. Every stored value has passed the
// parameter's range check.

use std::collections::{BTreeMap, HashMap};

use log::warn;
use serde::{Deserialize, Deserializer, Serialize};

use crate::calibration::ThresholdSet;
use crate::error::ProtocolError;
use crate::protocol::{DeviceCommand, TunableParam};

/// Current value of every tunable parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DeviceSettings {
    values: BTreeMap<TunableParam, f64>,
}

impl DeviceSettings {
    /// Factory defaults for all fourteen parameters
    pub fn factory() -> Self {
        Self {
            values: TunableParam::ALL
                .iter()
                .map(|param| (*param, param.spec().default))
                .collect(),
        }
    }

    pub fn get(&self, param: TunableParam) -> f64 {
        self.values
            .get(&param)
            .copied()
            .unwrap_or_else(|| param.spec().default)
    }

    /// Range-check and store `value`; integer parameters are rounded.
    pub fn set(&mut self, param: TunableParam, value: f64) -> Result<(), ProtocolError> {
        param.wire_value(value)?;
        let stored = if param.is_scaled() {
            value
        } else {
            value.round()
        };
        self.values.insert(param, stored);
        Ok(())
    }

    /// Like [`set`](Self::set), addressed by wire key
    pub fn set_by_key(&mut self, key: &str, value: f64) -> Result<TunableParam, ProtocolError> {
        let param = TunableParam::from_key(key)?;
        self.set(param, value)?;
        Ok(param)
    }

    pub fn thresholds(&self) -> ThresholdSet {
        let value = |param| self.get(param).round() as u16;
        ThresholdSet::new(
            value(TunableParam::Hst),
            value(TunableParam::Nmin),
            value(TunableParam::Nmax),
            value(TunableParam::Spt),
            value(TunableParam::Hpt),
        )
    }

    /// Replace the five thresholds, leaving the joystick settings alone.
    pub fn set_thresholds(&mut self, thresholds: &ThresholdSet) -> Result<(), ProtocolError> {
        for (param, value) in thresholds.entries() {
            param.wire_value(f64::from(value))?;
        }
        for (param, value) in thresholds.entries() {
            self.values.insert(param, f64::from(value));
        }
        Ok(())
    }

    /// One `SET_` command per parameter, in device apply order
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.iter()
            .filter_map(|(param, value)| match DeviceCommand::set_param(param, value) {
                Ok(command) => Some(command),
                Err(err) => {
                    warn!("[DeviceSettings] Skipping {}: {}", param, err);
                    None
                }
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TunableParam, f64)> + '_ {
        TunableParam::ALL
            .iter()
            .map(move |param| (*param, self.get(*param)))
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self::factory()
    }
}

/// Accepted input shapes: a flat `{"HST": 300, ...}` map, or the same map
/// under a `"settings"` key next to arbitrary metadata.
#[derive(Deserialize)]
#[serde(untagged)]
enum SettingsDocument {
    Wrapped { settings: HashMap<String, f64> },
    Flat(HashMap<String, f64>),
}

impl<'de> Deserialize<'de> for DeviceSettings {
    /// Missing keys keep their factory default; unknown keys are skipped
    /// with a warning; out-of-range values are an error.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = match SettingsDocument::deserialize(deserializer)? {
            SettingsDocument::Wrapped { settings } => settings,
            SettingsDocument::Flat(settings) => settings,
        };

        let mut result = DeviceSettings::factory();
        for (key, value) in entries {
            match result.set_by_key(&key, value) {
                Ok(_) => {}
                Err(ProtocolError::UnknownParam { .. }) => {
                    warn!("[DeviceSettings] Ignoring unknown setting {}", key);
                }
                Err(err) => return Err(serde::de::Error::custom(err)),
            }
        }
        Ok(result)
    }
}
