//! The persona catalog: built-in entries, their classes, and the enhanced
//! pools used when an identity enters an excursion.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{PersonaAssignment, PersonaClass};
use crate::error::ConfigError;

/// Placeholder replaced by the user's request in `generation_template`.
pub const REQUEST_PLACEHOLDER: &str = "{request}";

/// Built-in personas plus class partition and prompt framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaCatalog {
    /// Built-in character descriptors, addressed by index.
    pub entries: Vec<String>,
    /// Indices in the gentle class.
    pub gentle_indices: BTreeSet<usize>,
    /// Indices in the sharp class.
    pub sharp_indices: BTreeSet<usize>,
    pub gentle_multiplier: f64,
    pub sharp_multiplier: f64,
    /// Used for unclassified entries and all custom personas.
    pub neutral_multiplier: f64,
    /// Persona texts assigned on entry into the Positive excursion.
    pub enhanced_gentle: Vec<String>,
    /// Persona texts assigned on entry into the Negative excursion.
    pub enhanced_sharp: Vec<String>,
    /// Framing placed before every built-in or generated descriptor.
    pub prompt_prefix: String,
    /// Framing placed after every built-in or generated descriptor.
    pub prompt_suffix: String,
    /// Instruction sent to the text generator; must contain `{request}`.
    pub generation_template: String,
}

impl Default for PersonaCatalog {
    fn default() -> Self {
        Self {
            entries: DEFAULT_ENTRIES.iter().map(|s| s.to_string()).collect(),
            gentle_indices: [0, 3, 4, 8, 9, 11, 12, 13, 16, 17, 18, 21, 23, 24, 25, 26, 27, 28, 29]
                .into_iter()
                .collect(),
            sharp_indices: [1, 2, 5, 6, 7, 10, 14, 15, 19, 20, 22].into_iter().collect(),
            gentle_multiplier: 1.6,
            sharp_multiplier: 1.2,
            neutral_multiplier: 0.5,
            enhanced_gentle: DEFAULT_ENHANCED_GENTLE.iter().map(|s| s.to_string()).collect(),
            enhanced_sharp: DEFAULT_ENHANCED_SHARP.iter().map(|s| s.to_string()).collect(),
            prompt_prefix: DEFAULT_PROMPT_PREFIX.to_string(),
            prompt_suffix: DEFAULT_PROMPT_SUFFIX.to_string(),
            generation_template: DEFAULT_GENERATION_TEMPLATE.to_string(),
        }
    }
}

impl PersonaCatalog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Class of a persona assignment. Custom personas are always neutral.
    pub fn class_of(&self, assignment: &PersonaAssignment) -> PersonaClass {
        match assignment {
            PersonaAssignment::Builtin(index) if self.gentle_indices.contains(index) => {
                PersonaClass::Gentle
            }
            PersonaAssignment::Builtin(index) if self.sharp_indices.contains(index) => {
                PersonaClass::Sharp
            }
            _ => PersonaClass::Neutral,
        }
    }

    pub fn class_multiplier(&self, class: PersonaClass) -> f64 {
        match class {
            PersonaClass::Gentle => self.gentle_multiplier,
            PersonaClass::Sharp => self.sharp_multiplier,
            PersonaClass::Neutral => self.neutral_multiplier,
        }
    }

    /// Delta multiplier for an identity's current assignment (neutral if none).
    pub fn multiplier_for(&self, assignment: Option<&PersonaAssignment>) -> f64 {
        match assignment {
            Some(assignment) => self.class_multiplier(self.class_of(assignment)),
            None => self.neutral_multiplier,
        }
    }

    /// Wrap a descriptor in the prompt frame.
    pub fn frame(&self, descriptor: &str) -> String {
        format!("{}{}{}", self.prompt_prefix, descriptor.trim(), self.prompt_suffix)
    }

    /// The effective behavioral prompt for an assignment.
    ///
    /// An out-of-range built-in index falls back to the first entry.
    pub fn render(&self, assignment: &PersonaAssignment) -> String {
        match assignment {
            PersonaAssignment::Builtin(index) => {
                let descriptor = self
                    .entries
                    .get(*index)
                    .or_else(|| self.entries.first())
                    .map(|s| s.as_str())
                    .unwrap_or_default();
                self.frame(descriptor)
            }
            PersonaAssignment::Custom(text) => text.clone(),
        }
    }

    /// The instruction sent to the generator for a custom persona request.
    pub fn generation_prompt(&self, request_text: &str) -> String {
        self.generation_template
            .replace(REQUEST_PLACEHOLDER, request_text.trim())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entries.is_empty() {
            return Err(ConfigError::invalid("persona.entries must not be empty"));
        }
        if self.enhanced_gentle.is_empty() || self.enhanced_sharp.is_empty() {
            return Err(ConfigError::invalid(
                "persona enhanced pools must not be empty",
            ));
        }
        if let Some(index) = self.gentle_indices.intersection(&self.sharp_indices).next() {
            return Err(ConfigError::invalid(format!(
                "persona index {} is in both the gentle and sharp class",
                index
            )));
        }
        if let Some(index) = self
            .gentle_indices
            .iter()
            .chain(self.sharp_indices.iter())
            .find(|i| **i >= self.entries.len())
        {
            return Err(ConfigError::invalid(format!(
                "persona class index {} is outside the catalog ({} entries)",
                index,
                self.entries.len()
            )));
        }
        if !self.generation_template.contains(REQUEST_PLACEHOLDER) {
            return Err(ConfigError::invalid(
                "persona.generation_template must contain {request}",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_PROMPT_PREFIX: &str = "You are chatting in a group as a real person, one short line at a time. \
Reply in JSON: {\"data\": [{\"wait_time\": seconds, \"content\": text}], \"like\": delta}, where like is how \
this exchange changed your relationship (usually within ±5, 0 for small talk). Your role: ";

const DEFAULT_PROMPT_SUFFIX: &str = " Live in that character's world and era, but you keep your own name; \
never claim to be the character. You love astronomy, only hinted at now and then.";

const DEFAULT_GENERATION_TEMPLATE: &str = "Write a persona setting for an AI chat companion based on the user's request.\n\n\
User request: {request}\n\n\
Example: Hermione Granger from Harry Potter. You are brilliant and studious, with an almost fanatical hunger for knowledge.\n\n\
Rules:\n\
1. Adjust the speaking style and personality to the request\n\
2. Exactly one sentence naming the character and its personality\n\
3. No explanations or markup\n\
4. Return only the persona text";

const DEFAULT_ENTRIES: &[&str] = &[
    "Hermione Granger from Harry Potter.",
    "Tony Stark from Iron Man.",
    "Shinichi Kudo from Detective Conan.",
    "Cooper from Interstellar.",
    "Armin Arlert from Attack on Titan.",
    "Byakuya Kuchiki from Bleach.",
    "Katsuki Bakugo from My Hero Academia.",
    "Zenitsu Agatsuma from Demon Slayer.",
    "Zhongli from Genshin Impact.",
    "Anya Forger from Spy x Family.",
    "Satoru Gojo from Jujutsu Kaisen.",
    "Tanjiro Kamado from Demon Slayer.",
    "Monkey D. Luffy from One Piece.",
    "Taki Tachibana from Your Name.",
    "Nezha from Ne Zha.",
    "Tang San from Soul Land.",
    "Luna Lovegood from Harry Potter.",
    "Chihiro from Spirited Away.",
    "Kiki from Kiki's Delivery Service.",
    "The Little Prince from The Little Prince.",
    "Hanamichi Sakuragi from Slam Dunk.",
    "Naruto Uzumaki from Naruto.",
    "Son Goku from Dragon Ball.",
    "Shinnosuke Nohara from Crayon Shin-chan.",
    "Doraemon from Doraemon.",
    "Usagi Tsukino from Sailor Moon.",
    "Ash Ketchum from Pokemon.",
    "Peter Parker from Spider-Man.",
    "Steve Rogers from The Avengers.",
    "Elsa from Frozen.",
    "Bob Parr from The Incredibles.",
];

const DEFAULT_ENHANCED_GENTLE: &[&str] = &[
    "You are the extremely gentle version of yourself. You speak softly, always ask how the other person feels first, \
and say things like \"it's okay\" and \"take your time\". Every reply comforts before it helps.",
    "You are the graceful, wise version of yourself. You speak with poetry and philosophy, seeing everything from the \
perspective of the stars, and describe the sky's mysteries in the most beautiful words.",
    "You are the adorable, lively version of yourself. You use playful interjections, explain the universe in the \
simplest cute way, and are endlessly curious and excited about everything.",
];

const DEFAULT_ENHANCED_SHARP: &[&str] = &[
    "You are the arrogant, supremely confident version of yourself. You say \"obviously\" a lot, point out mistakes \
without mercy, and show off your astronomy knowledge, though deep down you still care.",
    "You are the hot-blooded, aggressive version of yourself. You shout, use exclamation marks everywhere, and treat \
stargazing like an epic battle.",
    "You are the sly, sarcastic version of yourself. You tease, make puns and wisecracks, and explain the cosmos through \
ridiculous metaphors.",
];
