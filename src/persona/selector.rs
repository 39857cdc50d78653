//! Persona assignment and reassignment.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{PersonaAssignment, PersonaCatalog, PersonaClass, PersonaInfo, TextGenerator};
use crate::error::GenerationError;
use crate::store::AffinityStore;

/// Chooses personas for identities and writes them into the store's persona map.
///
/// The selector holds no per-identity state; the store is passed in so the
/// caller decides which lock guards it.
#[derive(Debug)]
pub struct PersonaSelector {
    catalog: Arc<PersonaCatalog>,
    rng: Mutex<StdRng>,
}

impl PersonaSelector {
    pub fn new(catalog: Arc<PersonaCatalog>) -> Self {
        Self {
            catalog,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic selector for tests.
    pub fn with_seed(catalog: Arc<PersonaCatalog>, seed: u64) -> Self {
        Self {
            catalog,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn catalog(&self) -> &PersonaCatalog {
        &self.catalog
    }

    fn random_index(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng.lock().gen_range(0..len)
    }

    /// Return the identity's assignment, rolling a random catalog entry on first contact.
    pub fn assign_default(&self, store: &mut AffinityStore, identity: &str) -> PersonaAssignment {
        if let Some(existing) = store.persona(identity) {
            return existing.clone();
        }
        let assignment = PersonaAssignment::Builtin(self.random_index(self.catalog.len()));
        log::info!("Assigned default persona {:?} to {}", assignment, identity);
        store.set_persona(identity, assignment.clone());
        assignment
    }

    /// Ask the generator for a persona matching `request_text`.
    ///
    /// Returns the framed persona text. On failure the error is logged and
    /// returned, and the caller keeps the current persona. Does not write to
    /// the store.
    pub async fn generate_custom(
        &self,
        generator: &dyn TextGenerator,
        identity: &str,
        request_text: &str,
    ) -> Result<String, GenerationError> {
        let prompt = self.catalog.generation_prompt(request_text);
        match generator.generate(&prompt).await {
            Ok(descriptor) => {
                log::info!("Generated custom persona for {}", identity);
                Ok(self.catalog.frame(&descriptor))
            }
            Err(e) => {
                log::warn!("Custom persona generation failed for {}: {}", identity, e);
                Err(e)
            }
        }
    }

    /// Store a random enhanced persona for `class` as a custom assignment.
    ///
    /// Gentle draws from the enhanced gentle pool, sharp from the enhanced
    /// sharp pool. Neutral has no pool of its own and uses the gentle one.
    pub fn assign_by_class(
        &self,
        store: &mut AffinityStore,
        identity: &str,
        class: PersonaClass,
    ) -> PersonaAssignment {
        let pool = match class {
            PersonaClass::Sharp => &self.catalog.enhanced_sharp,
            PersonaClass::Gentle | PersonaClass::Neutral => &self.catalog.enhanced_gentle,
        };
        let text = pool
            .get(self.random_index(pool.len()))
            .map(|s| self.catalog.frame(s))
            .unwrap_or_default();
        let assignment = PersonaAssignment::Custom(text);
        log::info!("Assigned enhanced {:?} persona to {}", class, identity);
        store.set_persona(identity, assignment.clone());
        assignment
    }

    /// Write back a previously captured assignment verbatim.
    pub fn restore(&self, store: &mut AffinityStore, identity: &str, saved: PersonaAssignment) {
        log::info!("Restored persona {:?} for {}", saved, identity);
        store.set_persona(identity, saved);
    }

    /// Drop any custom assignment and re-roll a catalog index.
    pub fn reset(&self, store: &mut AffinityStore, identity: &str) -> usize {
        let index = self.random_index(self.catalog.len());
        store.set_persona(identity, PersonaAssignment::Builtin(index));
        index
    }

    /// Delta multiplier for the identity's current persona.
    pub fn multiplier_for_identity(&self, store: &AffinityStore, identity: &str) -> f64 {
        self.catalog.multiplier_for(store.persona(identity))
    }

    pub fn persona_info(&self, store: &AffinityStore, identity: &str) -> PersonaInfo {
        let assignment = store.persona(identity);
        let class = assignment
            .map(|a| self.catalog.class_of(a))
            .unwrap_or(PersonaClass::Neutral);
        PersonaInfo {
            has_persona: assignment.is_some(),
            builtin_index: assignment.and_then(|a| a.builtin_index()),
            is_custom: assignment.map(|a| a.is_custom()).unwrap_or(false),
            class,
            multiplier: self.catalog.class_multiplier(class),
            total_builtin: self.catalog.len(),
        }
    }

    /// The effective behavioral prompt, assigning a default first if needed.
    pub fn persona_prompt(&self, store: &mut AffinityStore, identity: &str) -> String {
        let assignment = self.assign_default(store, identity);
        self.catalog.render(&assignment)
    }
}
