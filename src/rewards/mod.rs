//! Periodic leaderboard: snapshot, archive, reset, and ranked rewards.
//!
//! The cycle is driven by [`scheduler::RewardSchedule`]; the steps are
//! exposed individually so admin tooling can run them by hand.

pub mod scheduler;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RewardConfig;
use crate::error::RewardError;
use crate::store::{check_period, ArchiveStore, AffinityStore, Direction};

pub use scheduler::{previous_period_key, RewardSchedule, ScheduleHandle};

/// One identity in a period snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub total_score: f64,
    pub direction: Direction,
}

/// Read-only export of every score at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub entries: BTreeMap<String, SnapshotEntry>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A ranked winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardEntry {
    pub rank: usize,
    pub identity: String,
    pub score: f64,
}

/// Winners of one period, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardReport {
    pub period: String,
    pub winners: Vec<RewardEntry>,
    /// Identities with a non-zero score.
    pub total_valid: usize,
    /// Number of identities reset after archiving (zero when recomputed from an archive).
    pub reset_count: usize,
}

impl fmt::Display for RewardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.winners.is_empty() {
            return write!(f, "⚪ No one had any affinity in period {}", self.period);
        }
        writeln!(
            f,
            "⚪ Affinity leaderboard for {}: top {}",
            self.period,
            self.winners.len()
        )?;
        writeln!(f)?;
        for winner in &self.winners {
            writeln!(
                f,
                "🏆 #{}: {}, affinity {:.2}",
                winner.rank, winner.identity, winner.score
            )?;
        }
        writeln!(f)?;
        write!(
            f,
            "{} of {} ranked users receive a reward.",
            self.winners.len(),
            self.total_valid
        )
    }
}

/// Computes and archives period rewards.
#[derive(Debug, Clone)]
pub struct PeriodicRewardCalculator {
    config: RewardConfig,
    archive: Arc<dyn ArchiveStore>,
}

impl PeriodicRewardCalculator {
    pub fn new(config: RewardConfig, archive: Arc<dyn ArchiveStore>) -> Self {
        Self { config, archive }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    pub fn export_snapshot(&self, store: &AffinityStore) -> Snapshot {
        let entries = store
            .records()
            .map(|(identity, record)| {
                (
                    identity.to_string(),
                    SnapshotEntry {
                        total_score: record.total_score,
                        direction: record.direction,
                    },
                )
            })
            .collect();
        Snapshot { entries }
    }

    /// Write `snapshot` as the archive for `period`. Archives are write-once.
    pub fn archive(&self, snapshot: &Snapshot, period: &str) -> Result<(), RewardError> {
        if snapshot.is_empty() {
            return Err(RewardError::EmptySnapshot);
        }
        check_period(period)?;
        let contents = serde_json::to_string_pretty(snapshot).map_err(crate::error::StoreError::from)?;
        self.archive.write_period(period, &contents)?;
        log::info!("Archived {} identities for period {}", snapshot.len(), period);
        Ok(())
    }

    pub fn load_archive(&self, period: &str) -> Result<Snapshot, RewardError> {
        check_period(period)?;
        let raw = self
            .archive
            .read_period(period)?
            .ok_or_else(|| RewardError::MissingArchive {
                period: period.to_string(),
            })?;
        let snapshot = serde_json::from_str(&raw).map_err(crate::error::StoreError::from)?;
        Ok(snapshot)
    }

    pub fn archived_periods(&self) -> Result<Vec<String>, RewardError> {
        Ok(self.archive.periods()?)
    }

    /// Zero every record and clear its excursion state; persona assignments stay.
    pub fn reset_all(&self, store: &mut AffinityStore) -> usize {
        let mut count = 0;
        for (_, record) in store.records_mut() {
            record.clear_excursion();
            count += 1;
        }
        store.persist();
        log::info!("Reset affinity for {} identities", count);
        count
    }

    /// How many of `total_valid` identities win.
    pub fn winner_count(&self, total_valid: usize) -> usize {
        if total_valid < self.config.min_count {
            return total_valid;
        }
        let scaled = (total_valid as f64 * self.config.percentage).round() as usize;
        scaled.clamp(self.config.min_count, self.config.max_count)
    }

    /// Rank non-zero scores descending (ties by identity) and take the winners.
    pub fn compute_rewards(&self, snapshot: &Snapshot) -> Vec<RewardEntry> {
        let mut valid: Vec<(&String, f64)> = snapshot
            .entries
            .iter()
            .filter(|(_, entry)| entry.total_score != 0.0)
            .map(|(identity, entry)| (identity, entry.total_score))
            .collect();
        valid.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let count = self.winner_count(valid.len());
        valid
            .into_iter()
            .take(count)
            .enumerate()
            .map(|(i, (identity, score))| RewardEntry {
                rank: i + 1,
                identity: identity.clone(),
                score,
            })
            .collect()
    }

    pub fn report(&self, period: &str, snapshot: &Snapshot, reset_count: usize) -> RewardReport {
        RewardReport {
            period: period.to_string(),
            winners: self.compute_rewards(snapshot),
            total_valid: snapshot
                .entries
                .values()
                .filter(|e| e.total_score != 0.0)
                .count(),
            reset_count,
        }
    }

    /// Export, archive, reset, then rank the archived snapshot.
    ///
    /// A failed archive aborts the cycle before anything is reset.
    pub fn run_cycle(
        &self,
        store: &mut AffinityStore,
        period: &str,
    ) -> Result<RewardReport, RewardError> {
        let snapshot = self.export_snapshot(store);
        self.archive(&snapshot, period)?;
        let reset_count = self.reset_all(store);
        let archived = self.load_archive(period)?;
        Ok(self.report(period, &archived, reset_count))
    }
}
