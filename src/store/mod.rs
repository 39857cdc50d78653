//! Durable keyed storage for affinity records and persona assignments.
//!
//! [`AffinityStore`] owns two maps sharing one key space: identity to
//! [`AffinityRecord`] and identity to [`PersonaAssignment`]. Both are read and
//! written wholesale as a single JSON document through a [`DocumentStore`]
//! backend.
//!
//! Loading never fails: a missing document starts empty, and a corrupt one is
//! logged and replaced by empty maps. Callers never see a parse error.

pub mod archive;
pub mod backend;
pub mod record;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::persona::PersonaAssignment;

pub use archive::{is_period_key, ArchiveStore, InMemoryArchive, JsonArchive};
pub(crate) use archive::check_period;
pub use backend::{DocumentStore, InMemoryStore, JsonFileStore};
pub use record::{round2, round3, AffinityRecord, Direction};

/// On-disk shape of the live document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AffinityDocument {
    #[serde(default)]
    pub affinity: BTreeMap<String, AffinityRecord>,
    #[serde(default)]
    pub personas: BTreeMap<String, PersonaAssignment>,
}

/// What `load()` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The document was decoded.
    Loaded { records: usize, personas: usize },
    /// No document existed yet.
    Missing,
    /// The document could not be read or decoded; empty maps were substituted.
    Recovered,
}

/// The live affinity store.
#[derive(Debug)]
pub struct AffinityStore {
    records: BTreeMap<String, AffinityRecord>,
    personas: BTreeMap<String, PersonaAssignment>,
    backend: Box<dyn DocumentStore>,
}

impl AffinityStore {
    /// Create an empty store without touching the backend.
    pub fn new(backend: impl DocumentStore + 'static) -> Self {
        Self {
            records: BTreeMap::new(),
            personas: BTreeMap::new(),
            backend: Box::new(backend),
        }
    }

    /// Create a store and load whatever the backend holds.
    pub fn open(backend: impl DocumentStore + 'static) -> Self {
        let mut store = Self::new(backend);
        store.load();
        store
    }

    /// Replace the in-memory maps with the backend's document.
    pub fn load(&mut self) -> LoadOutcome {
        let raw = match self.backend.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log::info!(
                    "No affinity document at {}, starting empty",
                    self.backend.location()
                );
                self.records.clear();
                self.personas.clear();
                return LoadOutcome::Missing;
            }
            Err(e) => {
                log::warn!(
                    "Failed to read affinity document at {}: {:#}; starting empty",
                    self.backend.location(),
                    e
                );
                self.records.clear();
                self.personas.clear();
                return LoadOutcome::Recovered;
            }
        };

        match serde_json::from_str::<AffinityDocument>(&raw) {
            Ok(document) => {
                self.records = document.affinity;
                self.personas = document.personas;
                log::info!(
                    "Loaded affinity document: {} records, {} personas",
                    self.records.len(),
                    self.personas.len()
                );
                LoadOutcome::Loaded {
                    records: self.records.len(),
                    personas: self.personas.len(),
                }
            }
            Err(e) => {
                log::warn!(
                    "Corrupt affinity document at {}: {}; starting empty",
                    self.backend.location(),
                    e
                );
                self.records.clear();
                self.personas.clear();
                LoadOutcome::Recovered
            }
        }
    }

    /// Write both maps to the backend.
    pub fn save(&self) -> Result<(), StoreError> {
        let document = DocumentRef {
            affinity: &self.records,
            personas: &self.personas,
        };
        let contents = serde_json::to_string_pretty(&document)?;
        self.backend.write(&contents)?;
        Ok(())
    }

    /// Save, logging instead of returning a failure. The in-memory state is
    /// kept either way. Returns whether the write succeeded.
    pub fn persist(&self) -> bool {
        match self.save() {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "Failed to persist affinity document to {}: {}",
                    self.backend.location(),
                    e
                );
                false
            }
        }
    }

    // --- Records ---

    pub fn get(&self, identity: &str) -> Option<&AffinityRecord> {
        self.records.get(identity)
    }

    /// Fetch the record for `identity`, creating a default one on first reference.
    pub fn get_or_create(&mut self, identity: &str) -> &mut AffinityRecord {
        self.records.entry(identity.to_string()).or_default()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.records.contains_key(identity)
    }

    /// Known identities in ascending order.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(|k| k.as_str())
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, &AffinityRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = (&str, &mut AffinityRecord)> {
        self.records.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replace an existing record with defaults. Returns false if the identity is unknown.
    pub fn reset_record(&mut self, identity: &str) -> bool {
        match self.records.get_mut(identity) {
            Some(record) => {
                *record = AffinityRecord::default();
                true
            }
            None => false,
        }
    }

    // --- Personas ---

    pub fn persona(&self, identity: &str) -> Option<&PersonaAssignment> {
        self.personas.get(identity)
    }

    pub fn set_persona(&mut self, identity: &str, assignment: PersonaAssignment) {
        self.personas.insert(identity.to_string(), assignment);
    }

    pub fn persona_count(&self) -> usize {
        self.personas.len()
    }
}

/// Borrowing twin of [`AffinityDocument`] so saving does not clone the maps.
#[derive(Serialize)]
struct DocumentRef<'a> {
    affinity: &'a BTreeMap<String, AffinityRecord>,
    personas: &'a BTreeMap<String, PersonaAssignment>,
}
