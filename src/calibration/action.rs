// Calibration actions and the per-action sample corpus

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Gesture the user performs while a recording window is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CalibrationAction {
    Neutral,
    #[serde(rename = "Soft Sip")]
    SoftSip,
    #[serde(rename = "Hard Sip")]
    HardSip,
    #[serde(rename = "Soft Puff")]
    SoftPuff,
    #[serde(rename = "Hard Puff")]
    HardPuff,
}

impl CalibrationAction {
    pub const ALL: [CalibrationAction; 5] = [
        CalibrationAction::Neutral,
        CalibrationAction::SoftSip,
        CalibrationAction::HardSip,
        CalibrationAction::SoftPuff,
        CalibrationAction::HardPuff,
    ];

    /// Get human-readable name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            CalibrationAction::Neutral => "Neutral",
            CalibrationAction::SoftSip => "Soft Sip",
            CalibrationAction::HardSip => "Hard Sip",
            CalibrationAction::SoftPuff => "Soft Puff",
            CalibrationAction::HardPuff => "Hard Puff",
        }
    }
}

impl fmt::Display for CalibrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for CalibrationAction {
    type Err = String;

    /// Accepts the display name or a kebab/snake-case spelling
    /// (`"Soft Sip"`, `"soft-sip"`, `"soft_sip"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        CalibrationAction::ALL
            .into_iter()
            .find(|action| action.display_name().replace(' ', "").to_lowercase() == normalized)
            .ok_or_else(|| format!("unknown calibration action: {}", s))
    }
}

/// Recorded pressure readings per action, in arrival order.
///
/// Re-recording an action replaces its sequence wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSampleSet {
    recordings: BTreeMap<CalibrationAction, Vec<u16>>,
}

impl ActionSampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a committed recording, returning the one it replaced.
    pub fn insert(&mut self, action: CalibrationAction, samples: Vec<u16>) -> Option<Vec<u16>> {
        self.recordings.insert(action, samples)
    }

    pub fn get(&self, action: CalibrationAction) -> Option<&[u16]> {
        self.recordings.get(&action).map(Vec::as_slice)
    }

    pub fn contains(&self, action: CalibrationAction) -> bool {
        self.recordings.contains_key(&action)
    }

    /// Number of recorded actions (an empty recording still counts).
    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    pub fn clear(&mut self) {
        self.recordings.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (CalibrationAction, &[u16])> {
        self.recordings
            .iter()
            .map(|(action, samples)| (*action, samples.as_slice()))
    }
}

impl FromIterator<(CalibrationAction, Vec<u16>)> for ActionSampleSet {
    fn from_iter<I: IntoIterator<Item = (CalibrationAction, Vec<u16>)>>(iter: I) -> Self {
        Self {
            recordings: iter.into_iter().collect(),
        }
    }
}
