// crates/wave-core/src/budget.rs
// ============================================================================
// Module: Budget Ledger
// Description: Token/cost accounting and threshold crossing for a session,
//              story, or single agent.
// Purpose: Give the budget accountant (C5) a single, monotone ledger type
//          with threshold-crossing detection that fires exactly once per
//          threshold.
// Dependencies: serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

/// A threshold level a budget ledger can cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdLevel {
    /// 50% of the cap has been consumed.
    Info,
    /// 75% of the cap has been consumed.
    Warn,
    /// 90% of the cap has been consumed.
    Critical,
    /// 100% (or more) of the cap has been consumed.
    Exceeded,
}

impl ThresholdLevel {
    /// The fraction of the cap (as consumed/cap) at which this level is reached.
    #[must_use]
    pub const fn fraction(self) -> f64 {
        match self {
            Self::Info => 0.50,
            Self::Warn => 0.75,
            Self::Critical => 0.90,
            Self::Exceeded => 1.00,
        }
    }

    /// All levels, ordered from lowest to highest fraction.
    pub const ALL: [Self; 4] = [Self::Info, Self::Warn, Self::Critical, Self::Exceeded];
}

/// Tracks tokens, estimated cost, and which thresholds have already fired
/// for one accounting scope (an agent, a story, or a session).
///
/// # Invariants
/// - `tokens_in`, `tokens_out`, and `estimated_cost_micros` are monotonically
///   non-decreasing; nothing in this type ever subtracts from them.
/// - Crossing a threshold emits exactly one signal of the corresponding
///   kind: [`BudgetLedger::record`] returns each newly crossed level at most
///   once, ever, for the lifetime of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLedger {
    /// Total input tokens recorded.
    pub tokens_in: u64,
    /// Total output tokens recorded.
    pub tokens_out: u64,
    /// Estimated cost in USD micro-dollars (1e-6 USD), avoiding float drift.
    pub estimated_cost_micros: u64,
    /// The absolute cap in cost micros this ledger is measured against.
    pub cap_micros: u64,
    /// Threshold levels already emitted; never shrinks.
    pub crossed: Vec<ThresholdLevel>,
}

impl BudgetLedger {
    /// Builds an empty ledger against the given absolute cap.
    #[must_use]
    pub const fn new(cap_micros: u64) -> Self {
        Self { tokens_in: 0, tokens_out: 0, estimated_cost_micros: 0, cap_micros, crossed: Vec::new() }
    }

    /// Fraction of the cap consumed so far, in `[0.0, +inf)`.
    #[must_use]
    pub fn consumed_fraction(&self) -> f64 {
        if self.cap_micros == 0 {
            return 1.0;
        }
        self.estimated_cost_micros as f64 / self.cap_micros as f64
    }

    /// Records additional usage and returns thresholds newly crossed by this call.
    ///
    /// Each [`ThresholdLevel`] is returned at most once across the ledger's
    /// lifetime, even if a single `record` call jumps straight past several
    /// thresholds at once (all of them are returned together, each still
    /// only once).
    pub fn record(&mut self, tokens_in: u64, tokens_out: u64, cost_micros: u64) -> Vec<ThresholdLevel> {
        self.tokens_in += tokens_in;
        self.tokens_out += tokens_out;
        self.estimated_cost_micros += cost_micros;

        let fraction = self.consumed_fraction();
        let mut newly_crossed = Vec::new();
        for level in ThresholdLevel::ALL {
            if fraction >= level.fraction() && !self.crossed.contains(&level) {
                self.crossed.push(level);
                newly_crossed.push(level);
            }
        }
        newly_crossed
    }

    /// Remaining budget in cost micros, saturating at zero once exceeded.
    #[must_use]
    pub fn remaining_micros(&self) -> u64 {
        self.cap_micros.saturating_sub(self.estimated_cost_micros)
    }

    /// Returns `true` once the 100% threshold has been crossed.
    #[must_use]
    pub fn is_exceeded(&self) -> bool {
        self.crossed.contains(&ThresholdLevel::Exceeded)
    }
}

/// A per-model cost rate, in micros per 1,000 tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRate {
    /// Cost per 1,000 input tokens, in USD micro-dollars.
    pub input_micros_per_1k: u64,
    /// Cost per 1,000 output tokens, in USD micro-dollars.
    pub output_micros_per_1k: u64,
}

impl ModelRate {
    /// Estimates the cost, in micros, of a turn with the given token counts.
    #[must_use]
    pub fn estimate_micros(&self, tokens_in: u64, tokens_out: u64) -> u64 {
        let input = tokens_in.saturating_mul(self.input_micros_per_1k) / 1_000;
        let output = tokens_out.saturating_mul(self.output_micros_per_1k) / 1_000;
        input.saturating_add(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_a_threshold_fires_exactly_once() {
        let mut ledger = BudgetLedger::new(1_000_000);
        let first = ledger.record(0, 0, 600_000);
        assert_eq!(first, vec![ThresholdLevel::Info, ThresholdLevel::Warn]);
        let second = ledger.record(0, 0, 1);
        assert!(second.is_empty());
    }

    #[test]
    fn exact_seventy_five_percent_is_treated_as_crossed() {
        let mut ledger = BudgetLedger::new(1_000_000);
        let crossed = ledger.record(0, 0, 750_000);
        assert!(crossed.contains(&ThresholdLevel::Warn));
    }

    #[test]
    fn exceeding_cap_sets_is_exceeded() {
        let mut ledger = BudgetLedger::new(1_000_000);
        ledger.record(0, 0, 1_000_000);
        assert!(ledger.is_exceeded());
        assert_eq!(ledger.remaining_micros(), 0);
    }

    #[test]
    fn model_rate_estimates_cost() {
        let rate = ModelRate { input_micros_per_1k: 3_000, output_micros_per_1k: 15_000 };
        assert_eq!(rate.estimate_micros(1_000, 1_000), 3_000 + 15_000);
    }
}
