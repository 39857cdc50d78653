//! Milestone detection over the speed-multiplier ladder.
//!
//! Everything here is pure: callers pass the score and the already-notified
//! set, and get back what was crossed. The updater applies the result.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Side of zero the score is travelling on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Travel {
    Positive,
    Negative,
}

impl Travel {
    /// Travel for a score; `None` at exactly zero.
    pub fn of(score: f64) -> Option<Self> {
        if score > 0.0 {
            Some(Travel::Positive)
        } else if score < 0.0 {
            Some(Travel::Negative)
        } else {
            None
        }
    }
}

/// A newly crossed ladder key.
#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneCrossing {
    /// The key selected for this notification.
    pub threshold: i64,
    /// The ladder's fixed speed multiplier for `threshold`.
    pub speed: f64,
    /// Every crossed key on this side, to be marked notified.
    pub passed: Vec<i64>,
    /// The following key in the direction of travel, if any.
    pub next: Option<i64>,
    /// Distance from the score to `next`.
    pub gap: Option<f64>,
    pub travel: Travel,
}

/// The next un-reached key for a score, used by status displays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NextMilestone {
    pub threshold: i64,
    pub gap: f64,
}

/// Sorted map from score boundary to fixed speed multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdLadder {
    steps: BTreeMap<i64, f64>,
}

impl ThresholdLadder {
    pub fn new(steps: BTreeMap<i64, f64>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn speed_at(&self, key: i64) -> Option<f64> {
        self.steps.get(&key).copied()
    }

    /// Find the nearest un-notified key the score has crossed.
    ///
    /// Positive scores consider only keys above zero, negative scores only
    /// keys below. Returns `None` when nothing new was crossed.
    pub fn detect(&self, score: f64, notified: &BTreeSet<i64>) -> Option<MilestoneCrossing> {
        let travel = Travel::of(score)?;

        let crossed: Vec<i64> = match travel {
            Travel::Positive => self
                .steps
                .range(1..)
                .map(|(k, _)| *k)
                .filter(|k| score >= *k as f64)
                .collect(),
            Travel::Negative => self
                .steps
                .range(..0)
                .map(|(k, _)| *k)
                .filter(|k| score <= *k as f64)
                .collect(),
        };

        // Nearest to the score is the largest positive key / smallest negative key.
        let threshold = match travel {
            Travel::Positive => crossed.iter().rev().find(|k| !notified.contains(k)),
            Travel::Negative => crossed.iter().find(|k| !notified.contains(k)),
        }
        .copied()?;

        let next = self.neighbor(threshold, travel);
        Some(MilestoneCrossing {
            threshold,
            speed: self.steps[&threshold],
            passed: crossed,
            next,
            gap: next.map(|n| (n as f64 - score).abs()),
            travel,
        })
    }

    /// Smallest key above `key` for positive travel, largest key below it for negative.
    pub fn neighbor(&self, key: i64, travel: Travel) -> Option<i64> {
        match travel {
            Travel::Positive => self.steps.range(key + 1..).next().map(|(k, _)| *k),
            Travel::Negative => self.steps.range(..key).next_back().map(|(k, _)| *k),
        }
    }

    /// The first key the score has not reached yet on its side of zero.
    ///
    /// At exactly zero the positive side is reported.
    pub fn next_milestone(&self, score: f64) -> Option<NextMilestone> {
        let key = if score < 0.0 {
            self.steps
                .range(..0)
                .rev()
                .map(|(k, _)| *k)
                .find(|k| (*k as f64) < score)
        } else {
            self.steps
                .range(1..)
                .map(|(k, _)| *k)
                .find(|k| (*k as f64) > score)
        }?;
        Some(NextMilestone {
            threshold: key,
            gap: (key as f64 - score).abs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EconomyConfig;

    fn ladder() -> ThresholdLadder {
        ThresholdLadder::new(EconomyConfig::default().ladder)
    }

    #[test]
    fn test_nothing_crossed_below_first_key() {
        assert!(ladder().detect(9.99, &BTreeSet::new()).is_none());
        assert!(ladder().detect(-4.0, &BTreeSet::new()).is_none());
        assert!(ladder().detect(0.0, &BTreeSet::new()).is_none());
    }

    #[test]
    fn test_positive_crossing_picks_nearest() {
        let crossing = ladder().detect(60.0, &BTreeSet::new()).unwrap();
        assert_eq!(crossing.threshold, 50);
        assert_eq!(crossing.speed, 0.9);
        assert_eq!(crossing.passed, vec![10, 25, 50]);
        assert_eq!(crossing.next, Some(100));
        assert_eq!(crossing.gap, Some(40.0));
        assert_eq!(crossing.travel, Travel::Positive);
    }

    #[test]
    fn test_negative_crossing_picks_nearest() {
        let crossing = ladder().detect(-80.0, &BTreeSet::new()).unwrap();
        assert_eq!(crossing.threshold, -50);
        assert_eq!(crossing.speed, 0.9);
        assert_eq!(crossing.passed, vec![-50, -25, -5]);
        assert_eq!(crossing.next, Some(-150));
        assert_eq!(crossing.gap, Some(70.0));
    }

    #[test]
    fn test_notified_keys_are_skipped() {
        let notified: BTreeSet<i64> = [10, 25, 50].into_iter().collect();
        assert!(ladder().detect(60.0, &notified).is_none());

        let notified: BTreeSet<i64> = [50].into_iter().collect();
        let crossing = ladder().detect(60.0, &notified).unwrap();
        assert_eq!(crossing.threshold, 25);
    }

    #[test]
    fn test_extremal_key_has_no_next() {
        let crossing = ladder().detect(12000.0, &BTreeSet::new()).unwrap();
        assert_eq!(crossing.threshold, 10000);
        assert!(crossing.next.is_none());
        assert!(crossing.gap.is_none());

        let crossing = ladder().detect(-10000.0, &BTreeSet::new()).unwrap();
        assert_eq!(crossing.threshold, -10000);
        assert!(crossing.next.is_none());
    }

    #[test]
    fn test_next_milestone() {
        let ladder = ladder();
        assert_eq!(
            ladder.next_milestone(0.0),
            Some(NextMilestone {
                threshold: 10,
                gap: 10.0
            })
        );
        assert_eq!(ladder.next_milestone(16.0).unwrap().threshold, 25);
        assert_eq!(ladder.next_milestone(-80.0).unwrap().threshold, -150);
        assert!(ladder.next_milestone(10000.0).is_none());
    }
}
