//! # Affinity Engine
//!
//! A per-identity affinity economy and persona state machine.
//!
//! Each identity carries a signed relationship score that moves with scored
//! interaction events. Crossing the excursion boundaries from the natural
//! state switches the identity to an enhanced persona until the score comes
//! back to exactly zero. Milestones along a fixed ladder ratchet a speed
//! multiplier that damps future deltas. Identities can hedge affinity
//! against each other for a fee, and a monthly cycle archives, resets, and
//! ranks everyone.
//!
//! ```text
//! scored event → AffinityUpdater → AffinityStore
//!                  ├─ PersonaSelector (excursion entry / return)
//!                  └─ ThresholdLadder (milestone ratchet)
//! TransferEngine ────────────────→ AffinityStore
//! PeriodicRewardCalculator ──────→ AffinityStore + ArchiveStore
//! ```

pub mod affinity;
pub mod config;
pub mod engine;
pub mod error;
pub mod persona;
pub mod rewards;
pub mod server;
pub mod store;

pub use affinity::{AffinityStatus, AffinityUpdater, DeltaOutcome, TransferEngine};
pub use config::AffinityConfig;
pub use engine::AffinityEngine;
pub use persona::{PersonaAssignment, PersonaCatalog, PersonaSelector};
pub use rewards::{PeriodicRewardCalculator, RewardReport, RewardSchedule};
pub use store::{AffinityRecord, AffinityStore, Direction};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
