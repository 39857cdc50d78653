//! The affinity economy.
//!
//! - [`updater`] applies scored events (`apply_delta`)
//! - [`threshold`] detects milestone crossings on the speed ladder
//! - [`transfer`] moves affinity between identities with a fee and a floor
//! - [`status`] read-only display helpers

pub mod status;
pub mod threshold;
pub mod transfer;
pub mod updater;

pub use status::{format_score, mood_for, status_of, AffinityStatus, MoodBand};
pub use threshold::{MilestoneCrossing, NextMilestone, ThresholdLadder, Travel};
pub use transfer::{TransferEngine, TransferQuote, TransferReceipt};
pub use updater::{AffinityUpdater, DeltaOutcome};
