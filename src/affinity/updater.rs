//! The delta pipeline: amplification, scaling, accumulation, excursion
//! hysteresis, and the milestone ratchet.

use serde::Serialize;

use super::threshold::{MilestoneCrossing, ThresholdLadder, Travel};
use crate::config::EconomyConfig;
use crate::persona::{PersonaClass, PersonaSelector};
use crate::store::{round2, round3, AffinityStore, Direction};

/// Result of one `apply_delta` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaOutcome {
    /// The scaled delta actually added to the score.
    pub adjusted_delta: f64,
    pub total_score: f64,
    pub direction: Direction,
    pub speed_multiplier: f64,
    /// Transition, restoration and milestone messages, newline separated. May be empty.
    pub notification: String,
}

/// Applies scored interaction events to affinity records.
#[derive(Debug, Clone)]
pub struct AffinityUpdater {
    economy: EconomyConfig,
    ladder: ThresholdLadder,
}

impl AffinityUpdater {
    pub fn new(economy: EconomyConfig) -> Self {
        let ladder = ThresholdLadder::new(economy.ladder.clone());
        Self { economy, ladder }
    }

    pub fn ladder(&self) -> &ThresholdLadder {
        &self.ladder
    }

    pub fn economy(&self) -> &EconomyConfig {
        &self.economy
    }

    /// Apply `raw_delta` to `identity` and persist the store.
    ///
    /// The order of steps is fixed; rounding happens after scaling and
    /// again after accumulation.
    pub fn apply_delta(
        &self,
        store: &mut AffinityStore,
        selector: &PersonaSelector,
        identity: &str,
        persona_multiplier: f64,
        raw_delta: f64,
    ) -> DeltaOutcome {
        let amplified = if raw_delta < 0.0 {
            raw_delta * self.economy.negative_amplification
        } else {
            raw_delta
        };

        let (speed, current) = store
            .get(identity)
            .map(|r| (r.speed_multiplier, r.total_score))
            .unwrap_or((1.0, 0.0));
        let adjusted_delta = round2(amplified * persona_multiplier * speed);
        let next_score = round2(current + adjusted_delta);
        if !adjusted_delta.is_finite() || !next_score.is_finite() {
            log::warn!(
                "{}: dropping delta {} (persona x{}, speed x{}), score would not be finite",
                identity,
                raw_delta,
                persona_multiplier,
                speed
            );
            return self.unchanged(store, identity);
        }

        let record = store.get_or_create(identity);
        record.total_score = next_score;
        let score = record.total_score;
        let direction = record.direction;
        let returning = !direction.is_natural() && score == 0.0 && record.saved_persona.is_some();

        log::debug!(
            "{}: raw {} -> adjusted {} (persona x{}, speed x{}), total {}",
            identity,
            raw_delta,
            adjusted_delta,
            persona_multiplier,
            record.speed_multiplier,
            score
        );

        let mut messages = Vec::new();

        if direction.is_natural() {
            let entering = if score >= self.economy.positive_excursion_boundary {
                Some(Direction::Positive)
            } else if score <= self.economy.negative_excursion_boundary {
                Some(Direction::Negative)
            } else {
                None
            };
            if let Some(target) = entering {
                messages.push(self.enter_excursion(store, selector, identity, target));
            }
        } else if returning {
            messages.push(self.return_to_natural(store, selector, identity));
        }

        let floor = self.economy.speed_floor;
        let record = store.get_or_create(identity);
        if let Some(crossing) = self.ladder.detect(record.total_score, &record.notified_milestones) {
            record
                .notified_milestones
                .extend(crossing.passed.iter().copied());
            record.speed_multiplier = crossing.speed.max(floor);
            messages.push(milestone_message(&crossing, record.total_score));
        }

        let outcome = DeltaOutcome {
            adjusted_delta,
            total_score: record.total_score,
            direction: record.direction,
            speed_multiplier: record.speed_multiplier,
            notification: messages.join("\n"),
        };

        store.persist();
        outcome
    }

    /// Outcome for a dropped delta: nothing applied, nothing persisted.
    fn unchanged(&self, store: &AffinityStore, identity: &str) -> DeltaOutcome {
        let (total_score, direction, speed_multiplier) = store
            .get(identity)
            .map(|r| (r.total_score, r.direction, r.speed_multiplier))
            .unwrap_or((0.0, Direction::Natural, 1.0));
        DeltaOutcome {
            adjusted_delta: 0.0,
            total_score,
            direction,
            speed_multiplier,
            notification: String::new(),
        }
    }

    fn enter_excursion(
        &self,
        store: &mut AffinityStore,
        selector: &PersonaSelector,
        identity: &str,
        target: Direction,
    ) -> String {
        let saved = selector.assign_default(store, identity);
        let class = match target {
            Direction::Negative => PersonaClass::Sharp,
            _ => PersonaClass::Gentle,
        };
        selector.assign_by_class(store, identity, class);

        let record = store.get_or_create(identity);
        record.saved_persona = Some(saved);
        record.direction = target;
        record.total_score = 0.0;
        record.speed_multiplier = round3(
            record.speed_multiplier * (1.0 - self.economy.excursion_speed_decay),
        )
        .max(self.economy.speed_floor);
        record.notified_milestones.clear();
        record.change_count += 1;

        log::info!(
            "{} entered {} excursion #{} (speed now {})",
            identity,
            target,
            record.change_count,
            record.speed_multiplier
        );

        match target {
            Direction::Negative => format!(
                "💢 Affinity fell to the negative boundary! The persona has turned sharp. \
                 Affinity restarts from 0 at speed x{:.3}; bring it back to exactly 0 to restore the original persona.",
                record.speed_multiplier
            ),
            _ => format!(
                "✨ Affinity reached the positive boundary! The persona has turned gentle. \
                 Affinity restarts from 0 at speed x{:.3}; bring it back to exactly 0 to restore the original persona.",
                record.speed_multiplier
            ),
        }
    }

    fn return_to_natural(
        &self,
        store: &mut AffinityStore,
        selector: &PersonaSelector,
        identity: &str,
    ) -> String {
        let record = store.get_or_create(identity);
        let previous = record.direction;
        let saved = record.saved_persona.take();
        record.direction = Direction::Natural;
        record.speed_multiplier = 1.0;
        record.notified_milestones.clear();

        if let Some(saved) = saved {
            selector.restore(store, identity, saved);
        }
        log::info!("{} returned to natural from {} excursion", identity, previous);

        "🔄 Affinity is back at 0. The original persona has been restored and speed reset to x1.000."
            .to_string()
    }
}

fn milestone_message(crossing: &MilestoneCrossing, score: f64) -> String {
    match (crossing.travel, crossing.next, crossing.gap) {
        (Travel::Positive, Some(next), Some(gap)) => format!(
            "🎉 Affinity passed {}! Speed is now x{:.3}. {:.2} more to reach {}.",
            crossing.threshold, crossing.speed, gap, next
        ),
        (Travel::Negative, Some(next), Some(gap)) => format!(
            "⚠️ Affinity dropped below {}. Speed is now x{:.3}. {:.2} further until {}.",
            crossing.threshold, crossing.speed, gap, next
        ),
        (Travel::Positive, _, _) => format!(
            "🏆 Affinity {:.2} has passed the highest milestone ({}). Nothing left to climb!",
            score, crossing.threshold
        ),
        (Travel::Negative, _, _) => format!(
            "🕳️ Affinity {:.2} has passed the lowest milestone ({}). It cannot get any colder.",
            score, crossing.threshold
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{PersonaAssignment, PersonaCatalog};
    use crate::store::InMemoryStore;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn setup() -> (AffinityUpdater, AffinityStore, PersonaSelector) {
        (
            AffinityUpdater::new(EconomyConfig::default()),
            AffinityStore::new(InMemoryStore::new()),
            PersonaSelector::with_seed(Arc::new(PersonaCatalog::default()), 42),
        )
    }

    fn flat_updater() -> AffinityUpdater {
        AffinityUpdater::new(EconomyConfig {
            ladder: BTreeMap::new(),
            ..Default::default()
        })
    }

    #[test]
    fn test_positive_delta_scaled() {
        let (updater, mut store, selector) = setup();
        let outcome = updater.apply_delta(&mut store, &selector, "alice", 1.6, 10.0);
        assert_eq!(outcome.adjusted_delta, 16.0);
        assert_eq!(outcome.total_score, 16.0);
        assert_eq!(store.get("alice").unwrap().total_score, 16.0);
    }

    #[test]
    fn test_negative_delta_amplified() {
        let (updater, mut store, selector) = setup();
        let outcome = updater.apply_delta(&mut store, &selector, "alice", 1.6, -10.0);
        assert_eq!(outcome.adjusted_delta, -80.0);
        assert_eq!(outcome.total_score, -80.0);
    }

    #[test]
    fn test_adjusted_delta_formula() {
        let updater = flat_updater();
        let selector = PersonaSelector::with_seed(Arc::new(PersonaCatalog::default()), 1);
        for (speed, multiplier, raw) in [
            (0.87, 1.2, 3.0),
            (0.93, 0.5, -1.0),
            (0.705, 1.6, 7.0),
            (0.05, 1.2, -3.0),
        ] {
            let mut store = AffinityStore::new(InMemoryStore::new());
            store.get_or_create("x").speed_multiplier = speed;
            let outcome = updater.apply_delta(&mut store, &selector, "x", multiplier, raw);
            let amplified = if raw < 0.0 { raw * 5.0 } else { raw };
            assert_eq!(outcome.adjusted_delta, round2(amplified * multiplier * speed));
        }
    }

    #[test]
    fn test_positive_excursion_entered_exactly_once() {
        let updater = flat_updater();
        let (_, mut store, selector) = setup();
        store.set_persona("alice", PersonaAssignment::Builtin(3));

        let mut entries = 0;
        for _ in 0..50 {
            let before = store.get_or_create("alice").direction;
            let outcome = updater.apply_delta(&mut store, &selector, "alice", 1.0, 100.0);
            if before.is_natural() && outcome.direction == Direction::Positive {
                entries += 1;
                assert_eq!(outcome.total_score, 0.0);
                assert!(!outcome.notification.is_empty());
                let record = store.get("alice").unwrap();
                assert_eq!(record.saved_persona, Some(PersonaAssignment::Builtin(3)));
                assert_eq!(record.speed_multiplier, 0.98);
                assert_eq!(record.change_count, 1);
                assert!(store.persona("alice").unwrap().is_custom());
                break;
            }
        }
        assert_eq!(entries, 1);

        // Further growth stays inside the excursion.
        for _ in 0..60 {
            let outcome = updater.apply_delta(&mut store, &selector, "alice", 1.0, 100.0);
            assert_eq!(outcome.direction, Direction::Positive);
        }
        assert_eq!(store.get("alice").unwrap().change_count, 1);
    }

    #[test]
    fn test_entry_without_persona_still_saves_one() {
        let (updater, mut store, selector) = setup();
        store.get_or_create("bob").total_score = -1990.0;
        let outcome = updater.apply_delta(&mut store, &selector, "bob", 1.0, -2.0);

        assert_eq!(outcome.direction, Direction::Negative);
        let record = store.get("bob").unwrap();
        assert!(record.saved_persona.is_some());
        assert!(record.notified_milestones.is_empty());
        assert_eq!(record.total_score, 0.0);
    }

    #[test]
    fn test_return_only_at_exact_zero() {
        let updater = flat_updater();
        let (_, mut store, selector) = setup();
        store.set_persona("carol", PersonaAssignment::Builtin(5));
        store.get_or_create("carol").total_score = 4990.0;
        updater.apply_delta(&mut store, &selector, "carol", 1.0, 10.0);
        assert_eq!(store.get("carol").unwrap().direction, Direction::Positive);

        // +10 at speed 0.98 -> 9.8
        let outcome = updater.apply_delta(&mut store, &selector, "carol", 1.0, 10.0);
        assert_eq!(outcome.total_score, 9.8);
        assert_eq!(outcome.direction, Direction::Positive);

        // -1 amplified to -4.9 -> 4.9, still away from natural
        let outcome = updater.apply_delta(&mut store, &selector, "carol", 1.0, -1.0);
        assert_eq!(outcome.total_score, 4.9);
        assert_eq!(outcome.direction, Direction::Positive);

        // -1 again -> exactly 0
        let outcome = updater.apply_delta(&mut store, &selector, "carol", 1.0, -1.0);
        assert_eq!(outcome.total_score, 0.0);
        assert_eq!(outcome.direction, Direction::Natural);
        assert!(outcome.notification.contains("restored"));

        let record = store.get("carol").unwrap();
        assert!(record.saved_persona.is_none());
        assert_eq!(record.speed_multiplier, 1.0);
        assert_eq!(store.persona("carol"), Some(&PersonaAssignment::Builtin(5)));
    }

    #[test]
    fn test_no_direct_flip_between_excursions() {
        let updater = flat_updater();
        let (_, mut store, selector) = setup();
        store.get_or_create("dave").total_score = 4999.0;
        updater.apply_delta(&mut store, &selector, "dave", 1.0, 1.0);
        assert_eq!(store.get("dave").unwrap().direction, Direction::Positive);

        let outcome = updater.apply_delta(&mut store, &selector, "dave", 1.0, -1000.0);
        assert!(outcome.total_score < -2000.0);
        assert_eq!(outcome.direction, Direction::Positive);
        assert_eq!(store.get("dave").unwrap().change_count, 1);
    }

    #[test]
    fn test_speed_decay_respects_floor() {
        let updater = flat_updater();
        let (_, mut store, selector) = setup();
        let record = store.get_or_create("erin");
        record.total_score = 4999.0;
        record.speed_multiplier = 0.05;
        updater.apply_delta(&mut store, &selector, "erin", 20.0, 1.0);
        assert_eq!(store.get("erin").unwrap().speed_multiplier, 0.05);
    }

    #[test]
    fn test_milestone_ratchet_overwrites_speed() {
        let (updater, mut store, selector) = setup();
        let outcome = updater.apply_delta(&mut store, &selector, "frank", 1.0, 60.0);
        assert_eq!(outcome.speed_multiplier, 0.9);
        assert!(outcome.notification.contains("passed 50"));
        assert!(outcome.notification.contains("40.00 more to reach 100"));

        let record = store.get("frank").unwrap();
        assert!(record.notified_milestones.contains(&10));
        assert!(record.notified_milestones.contains(&50));

        // Already notified: a small step adds no message.
        let outcome = updater.apply_delta(&mut store, &selector, "frank", 1.0, 1.0);
        assert!(outcome.notification.is_empty());
    }

    #[test]
    fn test_negative_milestone_message() {
        let (updater, mut store, selector) = setup();
        let outcome = updater.apply_delta(&mut store, &selector, "gina", 1.6, -10.0);
        assert!(outcome.notification.contains("dropped below -50"));
        assert_eq!(outcome.speed_multiplier, 0.9);
    }

    #[test]
    fn test_apply_delta_persists() {
        let backend = InMemoryStore::new();
        let mut store = AffinityStore::new(backend.clone());
        let (updater, _, selector) = setup();
        updater.apply_delta(&mut store, &selector, "hank", 1.0, 1.0);
        assert!(backend.contents().unwrap().contains("hank"));
    }

    #[test]
    fn test_overflowing_delta_is_dropped() {
        let backend = InMemoryStore::new();
        let mut store = AffinityStore::new(backend.clone());
        let (updater, _, selector) = setup();
        updater.apply_delta(&mut store, &selector, "alice", 1.0, 5.0);
        let record = store.get_or_create("mallory");
        record.direction = Direction::Positive;
        record.total_score = 12.5;
        record.saved_persona = Some(PersonaAssignment::Builtin(1));

        let outcome = updater.apply_delta(&mut store, &selector, "mallory", 1.6, -1e308);
        assert_eq!(outcome.adjusted_delta, 0.0);
        assert_eq!(outcome.total_score, 12.5);
        assert_eq!(outcome.direction, Direction::Positive);
        assert_eq!(store.get("mallory").unwrap().total_score, 12.5);

        let outcome = updater.apply_delta(&mut store, &selector, "alice", 1.0, 1e308 * 10.0);
        assert_eq!(outcome.total_score, 5.0);

        updater.apply_delta(&mut store, &selector, "mallory", 1.0, 1.0);
        let mut reopened = AffinityStore::new(backend);
        assert!(matches!(reopened.load(), crate::store::LoadOutcome::Loaded { .. }));
        assert_eq!(reopened.get("alice").unwrap().total_score, 5.0);
        assert!(reopened.get("mallory").unwrap().total_score.is_finite());
    }

    fn notify_everything(store: &mut AffinityStore, identity: &str) {
        let keys: Vec<i64> = EconomyConfig::default().ladder.keys().copied().collect();
        store
            .get_or_create(identity)
            .notified_milestones
            .extend(keys);
    }

    #[test]
    fn test_entry_clears_notified_milestones() {
        let (updater, mut store, selector) = setup();

        store.get_or_create("ivy").total_score = 4999.0;
        notify_everything(&mut store, "ivy");
        let outcome = updater.apply_delta(&mut store, &selector, "ivy", 1.0, 1.0);
        assert_eq!(outcome.direction, Direction::Positive);
        assert!(store.get("ivy").unwrap().notified_milestones.is_empty());

        store.get_or_create("jack").total_score = -1999.0;
        notify_everything(&mut store, "jack");
        let outcome = updater.apply_delta(&mut store, &selector, "jack", 1.0, -1.0);
        assert_eq!(outcome.direction, Direction::Negative);
        assert!(store.get("jack").unwrap().notified_milestones.is_empty());
    }

    #[test]
    fn test_negative_return_clears_milestones_and_restores() {
        let (updater, mut store, selector) = setup();
        store.set_persona("kate", PersonaAssignment::Builtin(7));
        store.get_or_create("kate").total_score = -1999.0;
        updater.apply_delta(&mut store, &selector, "kate", 1.0, -1.0);
        assert_eq!(store.get("kate").unwrap().direction, Direction::Negative);
        assert!(store.persona("kate").unwrap().is_custom());

        // Drift inside the excursion, picking up milestones on the way.
        let outcome = updater.apply_delta(&mut store, &selector, "kate", 1.0, -20.0);
        assert_eq!(outcome.direction, Direction::Negative);
        assert!(!store.get("kate").unwrap().notified_milestones.is_empty());

        let record = store.get_or_create("kate");
        record.total_score = -10.0;
        record.speed_multiplier = 1.0;
        let outcome = updater.apply_delta(&mut store, &selector, "kate", 1.0, 10.0);
        assert_eq!(outcome.total_score, 0.0);
        assert_eq!(outcome.direction, Direction::Natural);

        let record = store.get("kate").unwrap();
        assert!(record.notified_milestones.is_empty());
        assert!(record.saved_persona.is_none());
        assert_eq!(record.speed_multiplier, 1.0);
        assert_eq!(store.persona("kate"), Some(&PersonaAssignment::Builtin(7)));
    }
}
