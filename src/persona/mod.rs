//! Persona assignment: which behavioral profile drives an identity's replies.
//!
//! An identity is assigned either a built-in catalog entry (by index) or a
//! free-text custom persona. Catalog entries are split into a gentle and a
//! sharp class; anything else, including every custom persona, is neutral.
//! The class decides the multiplier applied to affinity deltas.
//!
//! # Architecture
//!
//! ```text
//! PersonaCatalog (entries, classes, enhanced pools, prompt frame)
//!   ↓  shared via Arc
//! PersonaSelector (random default / class-driven / restore / reset)
//!   ↓  writes
//! AffinityStore persona map
//!
//! TextGenerator (custom persona text, may fail → no change)
//! ```

pub mod catalog;
pub mod generator;
pub mod selector;

use serde::{Deserialize, Serialize};

pub use catalog::PersonaCatalog;
pub use generator::{ChatCompletionsGenerator, DisabledGenerator, TextGenerator};
pub use selector::PersonaSelector;

/// A persona assignment.
///
/// Serialized untagged: a built-in entry is a bare index, a custom persona a
/// bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PersonaAssignment {
    /// Index into the persona catalog.
    Builtin(usize),
    /// Generated or class-enhanced free text.
    Custom(String),
}

impl PersonaAssignment {
    pub fn is_custom(&self) -> bool {
        matches!(self, PersonaAssignment::Custom(_))
    }

    pub fn builtin_index(&self) -> Option<usize> {
        match self {
            PersonaAssignment::Builtin(index) => Some(*index),
            PersonaAssignment::Custom(_) => None,
        }
    }
}

/// Multiplier class of a persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaClass {
    Gentle,
    Sharp,
    Neutral,
}

/// Persona information for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaInfo {
    pub has_persona: bool,
    pub builtin_index: Option<usize>,
    pub is_custom: bool,
    pub class: PersonaClass,
    pub multiplier: f64,
    pub total_builtin: usize,
}
