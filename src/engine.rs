//! `AffinityEngine`: the single owner of the live store.
//!
//! Every operation that reads or writes records takes the store lock for
//! its whole duration, so a reward cycle never interleaves with a delta or
//! a transfer, and a transfer's two writes are never observed halfway. The
//! lock is never held across an `.await`.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::affinity::{
    status_of, AffinityStatus, AffinityUpdater, DeltaOutcome, NextMilestone, TransferEngine,
    TransferQuote, TransferReceipt,
};
use crate::config::AffinityConfig;
use crate::error::{PersonaChangeError, RewardError, TransferError};
use crate::persona::{
    ChatCompletionsGenerator, DisabledGenerator, PersonaAssignment, PersonaInfo, PersonaSelector,
    TextGenerator,
};
use crate::rewards::{PeriodicRewardCalculator, RewardEntry, RewardReport, Snapshot};
use crate::store::{AffinityStore, ArchiveStore, JsonArchive, JsonFileStore};

#[derive(Debug)]
pub struct AffinityEngine {
    store: Mutex<AffinityStore>,
    selector: PersonaSelector,
    updater: AffinityUpdater,
    transfers: TransferEngine,
    rewards: PeriodicRewardCalculator,
    generator: Arc<dyn TextGenerator>,
    manual_change_min_abs_score: f64,
}

impl AffinityEngine {
    pub fn new(
        config: &AffinityConfig,
        store: AffinityStore,
        archive: Arc<dyn ArchiveStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            selector: PersonaSelector::new(Arc::new(config.persona.clone())),
            updater: AffinityUpdater::new(config.economy.clone()),
            transfers: TransferEngine::new(config.transfer.clone()),
            rewards: PeriodicRewardCalculator::new(config.rewards.clone(), archive),
            generator,
            manual_change_min_abs_score: config.transfer.manual_change_min_abs_score,
        }
    }

    /// Build an engine over the file-backed store and archive named in `config`.
    ///
    /// Uses the chat-completions generator when an API key is configured.
    pub fn from_config(config: &AffinityConfig) -> Self {
        let store = AffinityStore::open(JsonFileStore::new(config.storage.document_path()));
        let archive: Arc<dyn ArchiveStore> =
            Arc::new(JsonArchive::new(config.storage.archive_path()));
        let generator: Arc<dyn TextGenerator> = if config.generator.api_key.is_some() {
            Arc::new(ChatCompletionsGenerator::new(&config.generator))
        } else {
            log::warn!("No generator API key configured; custom personas are disabled");
            Arc::new(DisabledGenerator)
        };
        Self::new(config, store, archive, generator)
    }

    /// Replace the selector's random source with a seeded one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        let catalog = Arc::new(self.selector.catalog().clone());
        self.selector = PersonaSelector::with_seed(catalog, seed);
        self
    }

    // --- Scored events ---

    /// Apply a delta with an explicit persona multiplier.
    pub fn apply_delta(&self, identity: &str, persona_multiplier: f64, raw_delta: f64) -> DeltaOutcome {
        let mut store = self.store.lock();
        self.updater
            .apply_delta(&mut store, &self.selector, identity, persona_multiplier, raw_delta)
    }

    /// Apply a delta scaled by the identity's current persona class.
    ///
    /// An identity seen for the first time gets a default persona first.
    pub fn record_interaction(&self, identity: &str, raw_delta: f64) -> DeltaOutcome {
        let mut store = self.store.lock();
        self.selector.assign_default(&mut store, identity);
        let multiplier = self.selector.multiplier_for_identity(&store, identity);
        self.updater
            .apply_delta(&mut store, &self.selector, identity, multiplier, raw_delta)
    }

    // --- Transfers ---

    pub fn transfer(
        &self,
        source: &str,
        target_partial: &str,
        amount: f64,
    ) -> Result<TransferReceipt, TransferError> {
        let mut store = self.store.lock();
        self.transfers.transfer(&mut store, source, target_partial, amount)
    }

    pub fn transfer_quote(
        &self,
        source: &str,
        target_partial: &str,
    ) -> Result<TransferQuote, TransferError> {
        let store = self.store.lock();
        self.transfers.quote(&store, source, target_partial)
    }

    // --- Rewards ---

    pub fn export_snapshot(&self) -> Snapshot {
        self.rewards.export_snapshot(&self.store.lock())
    }

    pub fn compute_rewards(&self, snapshot: &Snapshot) -> Vec<RewardEntry> {
        self.rewards.compute_rewards(snapshot)
    }

    pub fn reset_all(&self) -> usize {
        let mut store = self.store.lock();
        self.rewards.reset_all(&mut store)
    }

    /// Archive the live scores under `period`, reset them, and rank the archive.
    pub fn run_reward_cycle(&self, period: &str) -> Result<RewardReport, RewardError> {
        let mut store = self.store.lock();
        self.rewards.run_cycle(&mut store, period)
    }

    /// Recompute the leaderboard of an already archived period.
    pub fn rewards_for_period(&self, period: &str) -> Result<RewardReport, RewardError> {
        let snapshot = self.rewards.load_archive(period)?;
        Ok(self.rewards.report(period, &snapshot, 0))
    }

    pub fn archived_periods(&self) -> Result<Vec<String>, RewardError> {
        self.rewards.archived_periods()
    }

    // --- Admin ---

    /// Reset one identity's record to defaults. False if the identity has no record.
    pub fn reset_identity(&self, identity: &str) -> bool {
        let mut store = self.store.lock();
        let existed = store.reset_record(identity);
        if existed {
            store.persist();
            log::info!("Reset affinity record for {}", identity);
        }
        existed
    }

    // --- Personas ---

    fn check_manual_gate(&self, store: &AffinityStore, identity: &str) -> Result<(), PersonaChangeError> {
        let score = store.get(identity).map(|r| r.total_score).unwrap_or(0.0);
        if score.abs() < self.manual_change_min_abs_score {
            return Err(PersonaChangeError::ScoreTooLow {
                score,
                required: self.manual_change_min_abs_score,
            });
        }
        Ok(())
    }

    /// Leave an excursion on request: restore the captured persona and zero the score.
    pub fn restore_original_persona(&self, identity: &str) -> Result<PersonaInfo, PersonaChangeError> {
        let mut store = self.store.lock();
        self.check_manual_gate(&store, identity)?;

        let saved = store
            .get_or_create(identity)
            .saved_persona
            .clone()
            .ok_or(PersonaChangeError::NothingToRestore)?;
        store.get_or_create(identity).clear_excursion();
        self.selector.restore(&mut store, identity, saved);
        store.persist();

        Ok(self.selector.persona_info(&store, identity))
    }

    /// Generate and store a custom persona from free text.
    ///
    /// The gate is checked before calling the generator and again before
    /// committing, since the score may have moved while waiting.
    pub async fn request_custom_persona(
        &self,
        identity: &str,
        request_text: &str,
    ) -> Result<PersonaInfo, PersonaChangeError> {
        if request_text.trim().is_empty() {
            return Err(PersonaChangeError::EmptyRequest);
        }
        {
            let store = self.store.lock();
            self.check_manual_gate(&store, identity)?;
        }

        let text = self
            .selector
            .generate_custom(self.generator.as_ref(), identity, request_text)
            .await?;

        let mut store = self.store.lock();
        self.check_manual_gate(&store, identity)?;
        store.set_persona(identity, PersonaAssignment::Custom(text));
        store.persist();
        Ok(self.selector.persona_info(&store, identity))
    }

    /// Re-roll a built-in persona, dropping any custom one.
    pub fn reset_persona(&self, identity: &str) -> usize {
        let mut store = self.store.lock();
        let index = self.selector.reset(&mut store, identity);
        store.persist();
        index
    }

    // --- Read-only accessors ---

    pub fn status(&self, identity: &str) -> AffinityStatus {
        let store = self.store.lock();
        status_of(&store, &self.selector, self.updater.ladder(), identity)
    }

    pub fn score(&self, identity: &str) -> f64 {
        self.store
            .lock()
            .get(identity)
            .map(|r| r.total_score)
            .unwrap_or(0.0)
    }

    pub fn next_milestone(&self, identity: &str) -> Option<NextMilestone> {
        let score = self.score(identity);
        self.updater.ladder().next_milestone(score)
    }

    pub fn persona_info(&self, identity: &str) -> PersonaInfo {
        let store = self.store.lock();
        self.selector.persona_info(&store, identity)
    }

    pub fn persona_prompt(&self, identity: &str) -> String {
        let mut store = self.store.lock();
        let prompt = self.selector.persona_prompt(&mut store, identity);
        store.persist();
        prompt
    }

    pub fn identity_count(&self) -> usize {
        self.store.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::store::{Direction, InMemoryArchive, InMemoryStore};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Ok("A patient lighthouse keeper.".to_string())
        }
    }

    fn engine_with(generator: Arc<dyn TextGenerator>) -> AffinityEngine {
        AffinityEngine::new(
            &AffinityConfig::default(),
            AffinityStore::new(InMemoryStore::new()),
            Arc::new(InMemoryArchive::new()),
            generator,
        )
        .with_seed(11)
    }

    fn engine() -> AffinityEngine {
        engine_with(Arc::new(DisabledGenerator))
    }

    #[test]
    fn test_record_interaction_uses_persona_class() {
        let engine = engine();
        engine.store.lock().set_persona("alice", PersonaAssignment::Builtin(0));
        let outcome = engine.record_interaction("alice", 10.0);
        assert_eq!(outcome.adjusted_delta, 16.0);

        engine.store.lock().set_persona("bob", PersonaAssignment::Builtin(1));
        let outcome = engine.record_interaction("bob", 10.0);
        assert_eq!(outcome.adjusted_delta, 12.0);
    }

    #[test]
    fn test_record_interaction_assigns_default() {
        let engine = engine();
        engine.record_interaction("carol", 1.0);
        assert!(engine.persona_info("carol").has_persona);
    }

    #[test]
    fn test_transfer_through_engine() {
        let engine = engine();
        engine.apply_delta("alice", 1.0, 100.0);
        engine.apply_delta("bob", 1.0, -20.0);
        assert_eq!(engine.score("bob"), -100.0);

        let receipt = engine.transfer("alice", "bob", 50.0).unwrap();
        assert_eq!(receipt.target_after, -140.0);
        assert_eq!(engine.score("alice"), 50.0);
    }

    #[test]
    fn test_reward_cycle_and_recompute() {
        let engine = engine();
        engine.apply_delta("alice", 1.0, 10.0);
        engine.apply_delta("bob", 1.0, 20.0);

        let report = engine.run_reward_cycle("2026_09").unwrap();
        assert_eq!(report.winners.len(), 2);
        assert_eq!(engine.score("alice"), 0.0);

        let again = engine.rewards_for_period("2026_09").unwrap();
        assert_eq!(again.winners, report.winners);
        assert_eq!(engine.archived_periods().unwrap(), vec!["2026_09"]);
        assert!(matches!(
            engine.rewards_for_period("2026_01"),
            Err(RewardError::MissingArchive { .. })
        ));
    }

    #[test]
    fn test_reset_identity() {
        let engine = engine();
        engine.apply_delta("alice", 1.0, 10.0);
        assert!(engine.reset_identity("alice"));
        assert_eq!(engine.score("alice"), 0.0);
        assert!(!engine.reset_identity("nobody"));
    }

    #[test]
    fn test_restore_original_persona_gated() {
        let engine = engine();
        engine.apply_delta("alice", 1.0, 10.0);
        assert!(matches!(
            engine.restore_original_persona("alice"),
            Err(PersonaChangeError::ScoreTooLow { .. })
        ));

        {
            let mut store = engine.store.lock();
            store.get_or_create("alice").total_score = 200.0;
        }
        assert!(matches!(
            engine.restore_original_persona("alice"),
            Err(PersonaChangeError::NothingToRestore)
        ));
    }

    #[test]
    fn test_restore_original_persona_leaves_excursion() {
        let engine = engine();
        {
            let mut store = engine.store.lock();
            store.set_persona("alice", PersonaAssignment::Builtin(2));
            store.get_or_create("alice").total_score = 4999.0;
        }
        engine.apply_delta("alice", 1.0, 1.0);
        engine.apply_delta("alice", 1.0, -50.0);
        assert_eq!(engine.status("alice").direction, Direction::Positive);
        assert!(engine.score("alice") <= -150.0);

        let info = engine.restore_original_persona("alice").unwrap();
        assert_eq!(info.builtin_index, Some(2));
        let status = engine.status("alice");
        assert_eq!(status.direction, Direction::Natural);
        assert_eq!(status.total_score, 0.0);
        assert!(!status.has_saved_persona);
    }

    #[tokio::test]
    async fn test_request_custom_persona() {
        let engine = engine_with(Arc::new(EchoGenerator));
        engine.store.lock().get_or_create("alice").total_score = -150.0;

        let info = engine
            .request_custom_persona("alice", "someone calm")
            .await
            .unwrap();
        assert!(info.is_custom);
        assert!(engine
            .persona_prompt("alice")
            .contains("A patient lighthouse keeper."));
    }

    #[tokio::test]
    async fn test_request_custom_persona_failures_keep_persona() {
        let engine = engine();
        engine.store.lock().set_persona("bob", PersonaAssignment::Builtin(3));

        assert!(matches!(
            engine.request_custom_persona("bob", "  ").await,
            Err(PersonaChangeError::EmptyRequest)
        ));
        assert!(matches!(
            engine.request_custom_persona("bob", "a pirate").await,
            Err(PersonaChangeError::ScoreTooLow { .. })
        ));

        engine.store.lock().get_or_create("bob").total_score = 300.0;
        assert!(matches!(
            engine.request_custom_persona("bob", "a pirate").await,
            Err(PersonaChangeError::GenerationFailed(_))
        ));
        assert_eq!(engine.persona_info("bob").builtin_index, Some(3));
    }

    #[test]
    fn test_reset_persona_rolls_builtin() {
        let engine = engine();
        engine
            .store
            .lock()
            .set_persona("erin", PersonaAssignment::Custom("x".to_string()));
        let index = engine.reset_persona("erin");
        assert_eq!(engine.persona_info("erin").builtin_index, Some(index));
    }
}
