//! Hedging: one identity spends its own affinity to pull another's down.
//!
//! Only part of the amount paid reaches the target; the remainder is a fee
//! retained by nobody. The target never drops below the configured floor.

use std::fmt;

use serde::Serialize;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::store::{round2, AffinityStore};

/// A committed transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    pub source: String,
    pub target: String,
    /// Amount debited from the source.
    pub amount: f64,
    /// Amount subtracted from the target.
    pub effect: f64,
    /// `amount - effect`, credited to no one.
    pub fee: f64,
    pub source_before: f64,
    pub source_after: f64,
    pub target_before: f64,
    pub target_after: f64,
    /// Whether the requested amount was reduced to respect the floor.
    pub clamped: bool,
}

impl fmt::Display for TransferReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "✅ Hedge complete!")?;
        if self.clamped {
            writeln!(
                f,
                "⚖️ The target was near the floor, so the amount was reduced to {:.2}",
                self.amount
            )?;
        }
        writeln!(
            f,
            "📉 {}: {:.2} → {:.2} (-{:.2})",
            self.source, self.source_before, self.source_after, self.amount
        )?;
        writeln!(
            f,
            "📉 {}: {:.2} → {:.2} (-{:.2})",
            self.target, self.target_before, self.target_after, self.effect
        )?;
        write!(f, "💸 Fee retained: {:.2}", self.fee)
    }
}

/// Balances and allowed range for a prospective transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferQuote {
    pub source: String,
    pub target: String,
    pub source_balance: f64,
    pub target_balance: f64,
    pub min_amount: f64,
    pub max_amount: f64,
    pub effect_ratio: f64,
}

impl fmt::Display for TransferQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🎯 Target: {} (affinity {:.2})", self.target, self.target_balance)?;
        writeln!(f, "💰 Your affinity: {:.2}", self.source_balance)?;
        writeln!(
            f,
            "📏 You may spend between {:.2} and {:.2}",
            self.min_amount, self.max_amount
        )?;
        write!(
            f,
            "ℹ️ Only {:.0}% of the amount reaches the target",
            self.effect_ratio * 100.0
        )
    }
}

/// Executes hedging transfers against an [`AffinityStore`].
#[derive(Debug, Clone)]
pub struct TransferEngine {
    config: TransferConfig,
}

impl TransferEngine {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    /// Resolve a partial identity: exact match first, then unique substring match.
    pub fn resolve_target(
        &self,
        store: &AffinityStore,
        partial: &str,
    ) -> Result<String, TransferError> {
        if store.contains(partial) {
            return Ok(partial.to_string());
        }
        let mut candidates: Vec<String> = store
            .identities()
            .filter(|id| !partial.is_empty() && id.contains(partial))
            .map(|id| id.to_string())
            .collect();

        match candidates.len() {
            0 => Err(TransferError::UnknownTarget {
                partial: partial.to_string(),
            }),
            1 => Ok(candidates.remove(0)),
            _ => Err(TransferError::Ambiguous { candidates }),
        }
    }

    fn positive_balance(&self, store: &AffinityStore, source: &str) -> Result<f64, TransferError> {
        let balance = store.get(source).map(|r| r.total_score).unwrap_or(0.0);
        if balance <= 0.0 {
            return Err(TransferError::InsufficientBalance { balance });
        }
        Ok(balance)
    }

    /// Report balances and the allowed amount range without mutating anything.
    pub fn quote(
        &self,
        store: &AffinityStore,
        source: &str,
        target_partial: &str,
    ) -> Result<TransferQuote, TransferError> {
        let target = self.resolve_target(store, target_partial)?;
        if target == source {
            return Err(TransferError::SelfTransfer);
        }
        let source_balance = self.positive_balance(store, source)?;
        let target_balance = store.get(&target).map(|r| r.total_score).unwrap_or(0.0);

        Ok(TransferQuote {
            source: source.to_string(),
            target,
            source_balance,
            target_balance,
            min_amount: self.config.min_quote_amount.min(source_balance),
            max_amount: source_balance,
            effect_ratio: self.config.effect_ratio,
        })
    }

    /// Debit `amount` from `source` and subtract the fee-adjusted effect from the target.
    ///
    /// Every rejection happens before the first write, so a returned error
    /// means neither record changed. Both records are persisted together.
    pub fn transfer(
        &self,
        store: &mut AffinityStore,
        source: &str,
        target_partial: &str,
        amount: f64,
    ) -> Result<TransferReceipt, TransferError> {
        let target = self.resolve_target(store, target_partial)?;
        if target == source {
            return Err(TransferError::SelfTransfer);
        }
        let source_before = self.positive_balance(store, source)?;
        if amount <= 0.0 || !amount.is_finite() {
            return Err(TransferError::NonPositiveAmount);
        }
        if amount > source_before {
            return Err(TransferError::ExceedsBalance {
                amount,
                balance: source_before,
            });
        }

        let ratio = self.config.effect_ratio;
        let floor = self.config.target_floor;
        let target_before = store.get(&target).map(|r| r.total_score).unwrap_or(0.0);

        let mut amount = amount;
        let mut effect = amount * ratio;
        let mut target_after = target_before - effect;
        let mut clamped = false;

        if target_after < floor {
            let max_effect = target_before - floor;
            if max_effect <= 0.0 {
                return Err(TransferError::TargetAtFloor { floor });
            }
            let required = max_effect / ratio;
            if required > source_before {
                return Err(TransferError::ClampedUnaffordable {
                    required: round2(required),
                    balance: source_before,
                });
            }
            amount = required;
            effect = max_effect;
            target_after = floor;
            clamped = true;
        }

        let amount = round2(amount);
        let effect = round2(effect);
        let source_after = round2(source_before - amount);
        let target_after = round2(target_after);

        store.get_or_create(source).total_score = source_after;
        store.get_or_create(&target).total_score = target_after;
        store.persist();

        log::info!(
            "Transfer {} -> {}: amount {}, effect {}, clamped {}",
            source,
            target,
            amount,
            effect,
            clamped
        );

        Ok(TransferReceipt {
            source: source.to_string(),
            target,
            amount,
            effect,
            fee: round2(amount - effect),
            source_before,
            source_after,
            target_before,
            target_after,
            clamped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn store_with(scores: &[(&str, f64)]) -> AffinityStore {
        let mut store = AffinityStore::new(InMemoryStore::new());
        for (id, score) in scores {
            store.get_or_create(id).total_score = *score;
        }
        store
    }

    fn engine() -> TransferEngine {
        TransferEngine::new(TransferConfig::default())
    }

    #[test]
    fn test_plain_transfer() {
        let mut store = store_with(&[("alice", 100.0), ("bob", -100.0)]);
        let receipt = engine().transfer(&mut store, "alice", "bob", 50.0).unwrap();

        assert_eq!(receipt.effect, 40.0);
        assert_eq!(receipt.fee, 10.0);
        assert!(!receipt.clamped);
        assert_eq!(store.get("alice").unwrap().total_score, 50.0);
        assert_eq!(store.get("bob").unwrap().total_score, -140.0);
    }

    #[test]
    fn test_transfer_clamped_to_floor() {
        let mut store = store_with(&[("alice", 200.0), ("bob", -140.0)]);
        let receipt = engine().transfer(&mut store, "alice", "bob", 50.0).unwrap();

        assert!(receipt.clamped);
        assert_eq!(receipt.amount, 12.5);
        assert_eq!(receipt.fee, 2.5);
        assert_eq!(store.get("bob").unwrap().total_score, -150.0);
        assert_eq!(store.get("alice").unwrap().total_score, 187.5);
    }

    #[test]
    fn test_amount_over_balance_changes_nothing() {
        let mut store = store_with(&[("alice", 30.0), ("bob", 10.0)]);
        let err = engine().transfer(&mut store, "alice", "bob", 30.01).unwrap_err();

        assert!(matches!(err, TransferError::ExceedsBalance { .. }));
        assert_eq!(store.get("alice").unwrap().total_score, 30.0);
        assert_eq!(store.get("bob").unwrap().total_score, 10.0);
    }

    #[test]
    fn test_rejections() {
        let mut store = store_with(&[("alice", 0.0), ("bob", 5.0), ("bobby", 5.0), ("carl", -150.0)]);
        let engine = engine();

        assert!(matches!(
            engine.transfer(&mut store, "alice", "bob", 1.0),
            Err(TransferError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            engine.transfer(&mut store, "bob", "bob", 1.0),
            Err(TransferError::SelfTransfer)
        ));
        assert!(matches!(
            engine.transfer(&mut store, "bob", "carl", 0.0),
            Err(TransferError::NonPositiveAmount)
        ));
        assert!(matches!(
            engine.transfer(&mut store, "bob", "carl", 1.0),
            Err(TransferError::TargetAtFloor { .. })
        ));
        assert!(matches!(
            engine.transfer(&mut store, "bob", "zed", 1.0),
            Err(TransferError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_clamp_uses_only_what_is_needed() {
        let mut store = store_with(&[("alice", 30.0), ("bob", -149.0)]);
        let receipt = engine().transfer(&mut store, "alice", "bob", 30.0).unwrap();

        assert!(receipt.clamped);
        assert_eq!(receipt.amount, 1.25);
        assert_eq!(receipt.effect, 1.0);
        assert_eq!(store.get("alice").unwrap().total_score, 28.75);
        assert_eq!(store.get("bob").unwrap().total_score, -150.0);
    }

    #[test]
    fn test_rejected_transfer_creates_no_record() {
        let mut store = store_with(&[("bob", 5.0)]);
        let _ = engine().transfer(&mut store, "ghost", "bob", 1.0);
        assert!(!store.contains("ghost"));
    }

    #[test]
    fn test_resolve_target() {
        let store = store_with(&[("user_1001", 0.0), ("user_1002", 0.0), ("admin", 0.0)]);
        let engine = engine();

        assert_eq!(engine.resolve_target(&store, "admin").unwrap(), "admin");
        assert_eq!(engine.resolve_target(&store, "1002").unwrap(), "user_1002");
        match engine.resolve_target(&store, "user_") {
            Err(TransferError::Ambiguous { candidates }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_quote() {
        let store = store_with(&[("alice", 42.0), ("bob", -10.0)]);
        let quote = engine().quote(&store, "alice", "bo").unwrap();
        assert_eq!(quote.target, "bob");
        assert_eq!(quote.max_amount, 42.0);
        assert_eq!(quote.min_amount, 0.1);
        assert!(quote.to_string().contains("80%"));
    }

    #[test]
    fn test_receipt_text() {
        let mut store = store_with(&[("alice", 100.0), ("bob", -100.0)]);
        let text = engine()
            .transfer(&mut store, "alice", "bob", 50.0)
            .unwrap()
            .to_string();
        assert!(text.contains("alice: 100.00 → 50.00"));
        assert!(text.contains("bob: -100.00 → -140.00"));
        assert!(text.contains("Fee retained: 10.00"));
    }
}
