// ThresholdSet - the five ordered pressure thresholds
//
// Raw sensor readings run 0..=1023. Sips pull the reading down, puffs push it
// up, so the thresholds partition that range into five zones:
//
//   hard sip | soft sip | neutral | soft puff | hard puff
//           HST       NMIN      NMAX        SPT         HPT

use serde::{Deserialize, Serialize};

use crate::protocol::TunableParam;

/// Highest raw pressure reading the sensor ADC produces
pub const PRESSURE_MAX: u16 = 1023;

/// Minimum distance between adjacent thresholds
pub const MIN_ZONE_SEPARATION: u16 = 25;

/// Pressure thresholds, serialised with the device's wire keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ThresholdSet {
    /// Hard-sip threshold
    pub hst: u16,
    /// Neutral band lower bound
    pub nmin: u16,
    /// Neutral band upper bound
    pub nmax: u16,
    /// Soft-puff threshold
    pub spt: u16,
    /// Hard-puff threshold
    pub hpt: u16,
}

impl ThresholdSet {
    pub const DEFAULT: ThresholdSet = ThresholdSet {
        hst: 360,
        nmin: 460,
        nmax: 550,
        spt: 600,
        hpt: 700,
    };

    pub fn new(hst: u16, nmin: u16, nmax: u16, spt: u16, hpt: u16) -> Self {
        Self {
            hst,
            nmin,
            nmax,
            spt,
            hpt,
        }
    }

    /// Values low to high: `[HST, NMIN, NMAX, SPT, HPT]`
    pub fn as_array(&self) -> [u16; 5] {
        [self.hst, self.nmin, self.nmax, self.spt, self.hpt]
    }

    /// Pairs each value with its parameter key, low to high.
    pub fn entries(&self) -> [(TunableParam, u16); 5] {
        let values = self.as_array();
        let params = TunableParam::THRESHOLDS;
        [
            (params[0], values[0]),
            (params[1], values[1]),
            (params[2], values[2]),
            (params[3], values[3]),
            (params[4], values[4]),
        ]
    }

    pub fn get(&self, param: TunableParam) -> Option<u16> {
        match param {
            TunableParam::Hst => Some(self.hst),
            TunableParam::Nmin => Some(self.nmin),
            TunableParam::Nmax => Some(self.nmax),
            TunableParam::Spt => Some(self.spt),
            TunableParam::Hpt => Some(self.hpt),
            _ => None,
        }
    }

    /// Strictly increasing, inside `[0, 1023]`, gaps of at least `min_gap`.
    pub fn is_ordered_with_gap(&self, min_gap: u16) -> bool {
        let values = self.as_array();
        values.iter().all(|v| *v <= PRESSURE_MAX)
            && values
                .windows(2)
                .all(|pair| pair[1] > pair[0] && pair[1] - pair[0] >= min_gap)
    }

    /// Whether the set satisfies the zone invariant the firmware relies on.
    pub fn is_valid(&self) -> bool {
        self.is_ordered_with_gap(MIN_ZONE_SEPARATION)
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self::DEFAULT
    }
}
