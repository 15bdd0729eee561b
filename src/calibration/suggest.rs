// Threshold suggestion - turns recorded samples into a ThresholdSet
//
// This is a fixed heuristic, not a fitted model. The order of the steps
// decides which threshold gives way when constraints collide, and existing
// calibrations depend on that order, so the sequence below must not be
// rearranged:
//
// 1. per-action stats (floor average, min, max)
// 2. seed the neutral band from the known-stable range
// 3. sip side: soft sip raises NMIN, hard sip sets HST
// 4. puff side: soft puff lowers NMAX and sets SPT, hard puff sets HPT
// 5. clamp, re-centre a collapsed neutral band
// 6. left-to-right ordering sweep (HST first, HPT last)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::calibration::action::{ActionSampleSet, CalibrationAction};
use crate::calibration::thresholds::{ThresholdSet, MIN_ZONE_SEPARATION, PRESSURE_MAX};

/// Neutral range observed to be stable across sensors and users
pub const KNOWN_NEUTRAL_BAND: NeutralBand = NeutralBand {
    low: 425,
    high: 520,
};

/// Half-width used when the neutral band has to be rebuilt around a single
/// observed average
const NEUTRAL_FALLBACK_HALF_WIDTH: i32 = 10;

/// Smallest neutral band produced by the collapse re-centring step
const MIN_NEUTRAL_WIDTH: i32 = 10;

/// Raw pressure range used to seed NMIN/NMAX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeutralBand {
    pub low: i32,
    pub high: i32,
}

impl NeutralBand {
    pub fn is_degenerate(&self) -> bool {
        self.low >= self.high
    }
}

/// Summary statistics for one recorded action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStats {
    /// Floor of the arithmetic mean
    pub avg: i32,
    pub min: i32,
    pub max: i32,
    pub count: usize,
}

impl ActionStats {
    /// Compute stats; an empty slice yields all zeros.
    pub fn from_samples(samples: &[u16]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let sum: i64 = samples.iter().map(|s| i64::from(*s)).sum();
        let min = samples.iter().copied().min().unwrap_or(0);
        let max = samples.iter().copied().max().unwrap_or(0);
        Self {
            avg: (sum / samples.len() as i64) as i32,
            min: i32::from(min),
            max: i32::from(max),
            count: samples.len(),
        }
    }
}

/// Observations made while deriving thresholds, for the calibration log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionNote {
    /// The configured neutral band had low >= high; defaults were used
    DegenerateNeutralBand,
    /// No usable Neutral recording; the known band was used as-is
    NoNeutralRecording,
    /// Sip/puff data pushed NMIN past NMAX; the band was rebuilt
    NeutralBandRecentered,
}

/// Result of a derivation: thresholds plus the inputs that shaped them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSuggestion {
    pub thresholds: ThresholdSet,
    pub stats: BTreeMap<CalibrationAction, ActionStats>,
    pub notes: Vec<SuggestionNote>,
}

/// Deterministic threshold suggester
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdSuggester {
    neutral_band: NeutralBand,
}

impl ThresholdSuggester {
    pub fn new() -> Self {
        Self {
            neutral_band: KNOWN_NEUTRAL_BAND,
        }
    }

    /// Override the neutral seed band (mainly for sensors with a shifted
    /// resting point)
    pub fn with_neutral_band(mut self, band: NeutralBand) -> Self {
        self.neutral_band = band;
        self
    }

    pub fn neutral_band(&self) -> NeutralBand {
        self.neutral_band
    }

    /// Derive a threshold set from recorded samples.
    ///
    /// `current` supplies values for thresholds with no evidence in the
    /// samples; `defaults` backs the neutral band when the seed band is
    /// degenerate. The result always satisfies
    /// `0 <= HST < NMIN < NMAX < SPT < HPT <= 1023` with gaps of at least
    /// [`MIN_ZONE_SEPARATION`].
    pub fn derive(
        &self,
        samples: &ActionSampleSet,
        current: &ThresholdSet,
        defaults: &ThresholdSet,
    ) -> ThresholdSuggestion {
        let sep = i32::from(MIN_ZONE_SEPARATION);
        let top = i32::from(PRESSURE_MAX);
        let mut notes = Vec::new();

        let stats: BTreeMap<CalibrationAction, ActionStats> = samples
            .iter()
            .map(|(action, values)| (action, ActionStats::from_samples(values)))
            .collect();
        // an action with zero samples is recorded but carries no evidence
        let evidence = |action: CalibrationAction| stats.get(&action).filter(|s| s.count > 0);

        let mut hst = i32::from(current.hst);
        let mut spt = i32::from(current.spt);
        let mut hpt = i32::from(current.hpt);

        let (band_low, band_high) = if self.neutral_band.is_degenerate() {
            notes.push(SuggestionNote::DegenerateNeutralBand);
            (i32::from(defaults.nmin), i32::from(defaults.nmax))
        } else {
            (self.neutral_band.low, self.neutral_band.high)
        };
        let mut nmin = band_low;
        let mut nmax = band_high;

        let neutral = evidence(CalibrationAction::Neutral);
        match neutral {
            Some(neutral) if nmin >= nmax => {
                nmin = neutral.avg - NEUTRAL_FALLBACK_HALF_WIDTH;
                nmax = neutral.avg + NEUTRAL_FALLBACK_HALF_WIDTH;
            }
            Some(_) => {}
            None => notes.push(SuggestionNote::NoNeutralRecording),
        }

        // Sip side
        let soft_sip = evidence(CalibrationAction::SoftSip);
        if let Some(soft_sip) = soft_sip {
            nmin = nmin.max(soft_sip.max + sep);
        }
        if let Some(hard_sip) = evidence(CalibrationAction::HardSip) {
            hst = hard_sip.avg;
            if let Some(soft_sip) = soft_sip {
                hst = hst.min(soft_sip.min - sep);
            }
            hst = hst.min(nmin - sep);
        } else if let Some(soft_sip) = soft_sip {
            hst = soft_sip.min - sep;
        }

        // Puff side
        let soft_puff = evidence(CalibrationAction::SoftPuff);
        if let Some(soft_puff) = soft_puff {
            nmax = nmax.min(soft_puff.min - sep);
            spt = soft_puff.avg;
        }
        if let Some(hard_puff) = evidence(CalibrationAction::HardPuff) {
            hpt = hard_puff.avg.max(spt + sep);
        } else if soft_puff.is_some() {
            hpt = spt + 2 * sep;
        }

        let clamp = |v: i32| v.clamp(0, top);
        hst = clamp(hst);
        nmin = clamp(nmin);
        nmax = clamp(nmax);
        spt = clamp(spt);
        hpt = clamp(hpt);

        if nmin >= nmax {
            notes.push(SuggestionNote::NeutralBandRecentered);
            let center = match neutral {
                Some(neutral) if band_low >= band_high => neutral.avg,
                _ => (band_low + band_high) / 2,
            };
            let width = MIN_NEUTRAL_WIDTH.max(sep / 2);
            nmin = center - width / 2;
            nmax = nmin + width;

            hst = hst.min(nmin - sep);
            spt = spt.max(nmax + sep);
            hpt = hpt.max(spt + sep);
        }

        // Ordering sweep. Each lower bound is applied after the upper bound,
        // so the lower neighbour wins and the conflict is pushed upward. The
        // `top - k * sep` caps leave room for the thresholds above.
        hst = hst.min(nmin - sep).min(top - 4 * sep).max(0);
        nmin = nmin.min(nmax - sep).min(top - 3 * sep).max(hst + sep);
        nmax = nmax.min(spt - sep).min(top - 2 * sep).max(nmin + sep);
        spt = spt.min(hpt - sep).min(top - sep).max(nmax + sep);
        hpt = hpt.min(top).max(spt + sep);

        if nmin >= nmax {
            nmax = nmin + sep;
            spt = spt.max(nmax + sep);
            hpt = hpt.max(spt + sep);
        }

        let finish = |v: i32| clamp(v) as u16;
        ThresholdSuggestion {
            thresholds: ThresholdSet::new(
                finish(hst),
                finish(nmin),
                finish(nmax),
                finish(spt),
                finish(hpt),
            ),
            stats,
            notes,
        }
    }
}

impl Default for ThresholdSuggester {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive thresholds with the standard neutral band.
pub fn derive_thresholds(
    samples: &ActionSampleSet,
    current: &ThresholdSet,
    defaults: &ThresholdSet,
) -> ThresholdSet {
    ThresholdSuggester::new()
        .derive(samples, current, defaults)
        .thresholds
}
