//! Per-identity affinity record.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::persona::PersonaAssignment;

/// Round to two decimal places. Every score mutation passes through here.
pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Round to three decimal places (speed multipliers).
pub fn round3(value: f64) -> f64 {
    round_to(value, 3)
}

/// Rounds the exact binary value, ties to even, so `0.125` becomes `0.12`.
/// Historical documents were written with this rounding.
fn round_to(value: f64, places: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }
    match format!("{:.*}", places, value).parse::<f64>() {
        Ok(rounded) => rounded + 0.0,
        Err(_) => value,
    }
}

/// Which excursion state an identity is in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Natural,
    Positive,
    Negative,
}

impl Direction {
    pub fn is_natural(self) -> bool {
        self == Direction::Natural
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Natural => "natural",
            Direction::Positive => "positive",
            Direction::Negative => "negative",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Affinity state for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinityRecord {
    /// Signed score, always rounded to two decimals.
    pub total_score: f64,
    /// Current excursion state.
    pub direction: Direction,
    /// Damping factor applied to future deltas, in `[floor, 1.0]`.
    pub speed_multiplier: f64,
    /// Ladder keys already announced in the current excursion cycle.
    pub notified_milestones: BTreeSet<i64>,
    /// Number of excursion entries so far.
    pub change_count: u32,
    /// Persona captured at excursion entry, restored on return to Natural.
    pub saved_persona: Option<PersonaAssignment>,
}

impl Default for AffinityRecord {
    fn default() -> Self {
        Self {
            total_score: 0.0,
            direction: Direction::Natural,
            speed_multiplier: 1.0,
            notified_milestones: BTreeSet::new(),
            change_count: 0,
            saved_persona: None,
        }
    }
}

impl AffinityRecord {
    /// Zero the score and drop all excursion state, keeping the diagnostic counter.
    pub fn clear_excursion(&mut self) {
        self.total_score = 0.0;
        self.direction = Direction::Natural;
        self.speed_multiplier = 1.0;
        self.notified_milestones.clear();
        self.saved_persona = None;
    }

    pub fn in_excursion(&self) -> bool {
        !self.direction.is_natural()
    }
}
