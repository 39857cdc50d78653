//! Read-only views of an identity's affinity for display.

use serde::Serialize;

use super::threshold::{NextMilestone, ThresholdLadder};
use crate::persona::{PersonaInfo, PersonaSelector};
use crate::store::{AffinityStore, Direction};

/// Half-open score band `[min, max)` with its display emoji and reply attitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoodBand {
    pub min: f64,
    pub max: f64,
    pub emoji: &'static str,
    pub attitude: &'static str,
}

const fn band(min: f64, max: f64, emoji: &'static str, attitude: &'static str) -> MoodBand {
    MoodBand {
        min,
        max,
        emoji,
        attitude,
    }
}

pub const MOOD_BANDS: &[MoodBand] = &[
    band(-10000.0, -5000.0, "☠️", "furious, barely willing to talk"),
    band(-5000.0, -2000.0, "🔥", "very angry and rude"),
    band(-2000.0, -1200.0, "⚡", "clearly upset and curt"),
    band(-1200.0, -780.0, "🌋", "impatient and dismissive"),
    band(-780.0, -550.0, "🌪️", "somewhat annoyed"),
    band(-550.0, -380.0, "🧊", "cold and distant"),
    band(-380.0, -200.0, "🪨", "flat and indifferent"),
    band(-200.0, -150.0, "💨", "mildly displeased"),
    band(-150.0, -50.0, "🌫️", "a little puzzled"),
    band(-50.0, -25.0, "🍂", "still fairly friendly"),
    band(-25.0, -5.0, "🌾", "ordinary and calm"),
    band(-5.0, 0.0, "⚪", "neutral and calm"),
    band(0.0, 10.0, "🌱", "friendly and calm"),
    band(10.0, 25.0, "🍃", "friendly and calm"),
    band(25.0, 50.0, "🍀", "friendly and cheerful"),
    band(50.0, 100.0, "🌿", "friendly and cheerful"),
    band(100.0, 150.0, "🌼", "happy and pleasant"),
    band(150.0, 200.0, "🎶", "very happy"),
    band(200.0, 260.0, "💎", "especially close"),
    band(260.0, 320.0, "🔮", "especially close"),
    band(320.0, 380.0, "🫧", "especially close"),
    band(380.0, 460.0, "🌸", "really fond of you"),
    band(460.0, 550.0, "🌺", "really fond of you"),
    band(550.0, 660.0, "🦋", "doting"),
    band(660.0, 780.0, "🐚", "doting"),
    band(780.0, 950.0, "✨", "deeply affectionate"),
    band(950.0, 1200.0, "🌈", "deeply affectionate"),
    band(1200.0, 1600.0, "🌙", "cherishing you above all"),
    band(1600.0, 2000.0, "🪐", "cherishing you above all"),
    band(2000.0, 3000.0, "🌟", "treating you as the most important person"),
    band(3000.0, 4000.0, "🌞", "treating you as the most important person"),
    band(4000.0, 5000.0, "🌊", "treating you as the most important person"),
    band(5000.0, 7000.0, "💫", "you are my whole world"),
    band(7000.0, 10000.0, "☀️", "you are my whole world"),
    band(10000.0, f64::INFINITY, "🌌", "love beyond everything"),
];

/// Emoji and attitude for a score. Scores outside every band fall back by sign.
pub fn mood_for(score: f64) -> (&'static str, &'static str) {
    MOOD_BANDS
        .iter()
        .find(|b| b.min <= score && score < b.max)
        .map(|b| (b.emoji, b.attitude))
        .unwrap_or(if score >= 0.0 {
            ("😊", "friendly and calm")
        } else {
            ("😐", "flat and indifferent")
        })
}

/// `"{emoji}{score:.2}"`
pub fn format_score(score: f64) -> String {
    let (emoji, _) = mood_for(score);
    format!("{}{:.2}", emoji, score)
}

/// Everything the dispatch layer shows about one identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffinityStatus {
    pub identity: String,
    pub total_score: f64,
    pub display: String,
    pub emoji: &'static str,
    pub attitude: &'static str,
    pub direction: Direction,
    pub speed_multiplier: f64,
    pub change_count: u32,
    pub has_saved_persona: bool,
    pub next_milestone: Option<NextMilestone>,
    pub persona: PersonaInfo,
}

/// Build the status view. Unknown identities report a default record without creating one.
pub fn status_of(
    store: &AffinityStore,
    selector: &PersonaSelector,
    ladder: &ThresholdLadder,
    identity: &str,
) -> AffinityStatus {
    let record = store.get(identity).cloned().unwrap_or_default();
    let (emoji, attitude) = mood_for(record.total_score);

    AffinityStatus {
        identity: identity.to_string(),
        total_score: record.total_score,
        display: format_score(record.total_score),
        emoji,
        attitude,
        direction: record.direction,
        speed_multiplier: record.speed_multiplier,
        change_count: record.change_count,
        has_saved_persona: record.saved_persona.is_some(),
        next_milestone: ladder.next_milestone(record.total_score),
        persona: selector.persona_info(store, identity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EconomyConfig;
    use crate::persona::PersonaCatalog;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_bands_are_contiguous() {
        for pair in MOOD_BANDS.windows(2) {
            assert_eq!(pair[0].max, pair[1].min);
        }
    }

    #[test]
    fn test_mood_lookup() {
        assert_eq!(mood_for(0.0).0, "🌱");
        assert_eq!(mood_for(-0.01).0, "⚪");
        assert_eq!(mood_for(16.0).0, "🍃");
        assert_eq!(mood_for(1_000_000.0).0, "🌌");
        assert_eq!(mood_for(-20000.0).0, "😐");
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(16.0), "🍃16.00");
        assert_eq!(format_score(-80.0), "🌫️-80.00");
    }

    #[test]
    fn test_status_of_unknown_identity() {
        let store = AffinityStore::new(InMemoryStore::new());
        let selector = PersonaSelector::with_seed(Arc::new(PersonaCatalog::default()), 3);
        let ladder = ThresholdLadder::new(EconomyConfig::default().ladder);

        let status = status_of(&store, &selector, &ladder, "nobody");
        assert_eq!(status.total_score, 0.0);
        assert_eq!(status.direction, Direction::Natural);
        assert_eq!(status.next_milestone.unwrap().threshold, 10);
        assert!(!status.persona.has_persona);
        assert!(!store.contains("nobody"));
    }

    #[test]
    fn test_status_reports_next_gap() {
        let mut store = AffinityStore::new(InMemoryStore::new());
        store.get_or_create("alice").total_score = -80.0;
        let selector = PersonaSelector::with_seed(Arc::new(PersonaCatalog::default()), 3);
        let ladder = ThresholdLadder::new(EconomyConfig::default().ladder);

        let status = status_of(&store, &selector, &ladder, "alice");
        let next = status.next_milestone.unwrap();
        assert_eq!(next.threshold, -150);
        assert_eq!(next.gap, 70.0);
        assert_eq!(status.display, "🌫️-80.00");
    }
}
