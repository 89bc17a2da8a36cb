// crates/wave-governor/src/accountant.rs
// ============================================================================
// Module: Budget Accountant
// Description: Per-agent, per-story, and per-session token/cost accounting
//              against the ledgers defined in wave-core (C5).
// Purpose: Give the dispatcher a single `record` entry point that resolves a
//          model's cost rate, folds usage into the right ledgers, and
//          reports which thresholds were newly crossed so the orchestrator
//          can emit exactly one signal per threshold (§4.5, §8 property
//          "crossing a budget threshold exactly once per threshold").
// Dependencies: wave-core::{BudgetLedger, ModelRate, ThresholdLevel}
// ============================================================================

use std::collections::HashMap;

use tracing::info;
use tracing::warn;

use wave_core::BudgetLedger;
use wave_core::ModelRate;
use wave_core::ThresholdLevel;

/// A single accounting event: usage recorded against one story within one session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// Threshold levels the session ledger newly crossed.
    pub session_crossed: Vec<ThresholdLevel>,
    /// Threshold levels the story ledger newly crossed.
    pub story_crossed: Vec<ThresholdLevel>,
    /// `true` iff the story-level cap was exceeded by this record (the story
    /// stops; the session does not).
    pub story_exceeded: bool,
}

/// Error returned by the budget accountant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountantError {
    /// No rate is configured for the given model identifier.
    #[error("no cost rate configured for model {0}")]
    UnknownModel(String),
}

/// Tracks a session ledger plus one ledger per story, single-writer per
/// session (§9 resolved Open Question: no cross-session rate limiter).
///
/// # Invariants
/// - `record` never subtracts from either ledger; both are monotone.
/// - A given [`ThresholdLevel`] is returned from `record` at most once per
///   ledger for the ledger's lifetime.
#[derive(Debug)]
pub struct BudgetAccountant {
    rates: HashMap<String, ModelRate>,
    session: BudgetLedger,
    stories: HashMap<String, BudgetLedger>,
}

impl BudgetAccountant {
    /// Builds an accountant for one session, given its cap and a per-model rate table.
    #[must_use]
    pub fn new(session_cap_micros: u64, rates: HashMap<String, ModelRate>) -> Self {
        Self { rates, session: BudgetLedger::new(session_cap_micros), stories: HashMap::new() }
    }

    /// Registers (or re-registers) a story-level cap. Idempotent: calling
    /// this twice for the same story id resets that story's ledger, which
    /// callers should only do once, at story-submission time.
    pub fn register_story(&mut self, story_id: impl Into<String>, cap_micros: u64) {
        self.stories.insert(story_id.into(), BudgetLedger::new(cap_micros));
    }

    /// Records one worker turn's usage against both the story and session
    /// ledgers, resolving cost via the configured per-model rate table.
    ///
    /// # Errors
    /// Returns [`AccountantError::UnknownModel`] if `model` has no configured rate.
    pub fn record(
        &mut self,
        story_id: &str,
        tokens_in: u64,
        tokens_out: u64,
        model: &str,
    ) -> Result<RecordOutcome, AccountantError> {
        let rate = self.rates.get(model).ok_or_else(|| AccountantError::UnknownModel(model.to_string()))?;
        let cost_micros = rate.estimate_micros(tokens_in, tokens_out);

        let session_crossed = self.session.record(tokens_in, tokens_out, cost_micros);
        let story_crossed = match self.stories.get_mut(story_id) {
            Some(ledger) => ledger.record(tokens_in, tokens_out, cost_micros),
            None => Vec::new(),
        };
        let story_exceeded = self.stories.get(story_id).is_some_and(BudgetLedger::is_exceeded);

        for level in &session_crossed {
            if *level == ThresholdLevel::Exceeded {
                warn!(story_id, "session budget exceeded; session will be paused");
            } else {
                info!(story_id, ?level, "session budget threshold crossed");
            }
        }
        if story_exceeded {
            warn!(story_id, "story budget exceeded; story dispatch stops, session continues");
        }

        Ok(RecordOutcome { session_crossed, story_crossed, story_exceeded })
    }

    /// Remaining budget in cost micros for the whole session.
    #[must_use]
    pub fn remaining_session(&self) -> u64 {
        self.session.remaining_micros()
    }

    /// Remaining budget in cost micros for one story, or `None` if the story
    /// was never registered.
    #[must_use]
    pub fn remaining_story(&self, story_id: &str) -> Option<u64> {
        self.stories.get(story_id).map(BudgetLedger::remaining_micros)
    }

    /// A snapshot of the session ledger, suitable for checkpointing.
    #[must_use]
    pub fn session_ledger(&self) -> &BudgetLedger {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> HashMap<String, ModelRate> {
        let mut rates = HashMap::new();
        rates.insert("gpt-x".to_string(), ModelRate { input_micros_per_1k: 1_000, output_micros_per_1k: 2_000 });
        rates
    }

    #[test]
    fn unknown_model_is_rejected() {
        let mut accountant = BudgetAccountant::new(1_000_000, rates());
        let err = accountant.record("s1", 10, 10, "unknown").unwrap_err();
        assert_eq!(err, AccountantError::UnknownModel("unknown".to_string()));
    }

    #[test]
    fn story_cap_exceeds_independently_of_session() {
        let mut accountant = BudgetAccountant::new(1_000_000_000, rates());
        accountant.register_story("s1", 1_000);
        let outcome = accountant.record("s1", 1_000, 1_000, "gpt-x").unwrap();
        assert!(outcome.story_exceeded);
        assert!(accountant.remaining_session() > 0);
    }

    #[test]
    fn session_threshold_crosses_exactly_once() {
        let mut accountant = BudgetAccountant::new(10_000, rates());
        accountant.register_story("s1", 10_000);
        let first = accountant.record("s1", 3_000, 0, "gpt-x").unwrap();
        assert_eq!(first.session_crossed, vec![ThresholdLevel::Info, ThresholdLevel::Warn, ThresholdLevel::Critical]);
        let second = accountant.record("s1", 1, 0, "gpt-x").unwrap();
        assert!(second.session_crossed.contains(&ThresholdLevel::Exceeded));
        let third = accountant.record("s1", 0, 0, "gpt-x").unwrap();
        assert!(third.session_crossed.is_empty());
    }
}
