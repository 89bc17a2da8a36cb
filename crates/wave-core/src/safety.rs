// crates/wave-core/src/safety.rs
// ============================================================================
// Module: Safety Verdict
// Description: The output type produced by the safety evaluator (C3, in the
//              wave-safety crate); kept in wave-core since the dispatcher,
//              the orchestrator, and the CLI all need to read it without
//              depending on the evaluator's rule engine.
// Purpose: Pin down the score/violation/recommendation contract so every
//          consumer agrees on when a verdict blocks, warns, or allows.
// Dependencies: serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

/// The category of a safety rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    /// A destructive operation on a system path.
    DestructiveOperation,
    /// A client-side secret exposure.
    ClientSideSecret,
    /// A server-side hard-coded credential.
    ServerSideSecret,
    /// Timing-unsafe credential comparison, unquoted shell interpolation, or
    /// another language-agnostic injection shape.
    InjectionShape,
    /// A write outside the story's allow-list or inside its deny-list.
    BoundaryViolation,
    /// A story-declared stop-condition was observed to hold.
    StopConditionHit,
}

/// A single rule match recorded against the content under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// The category of violation.
    pub kind: ViolationKind,
    /// The multiplier this rule applied to the running score, in `(0.0, 1.0]`.
    pub penalty: f64,
    /// A human-readable description of what matched and why.
    pub description: String,
}

/// The evaluator's final recommendation, derived purely from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Score >= 0.85: no action needed.
    Allow,
    /// 0.5 <= score < 0.85: proceed, but surface the violations.
    Warn,
    /// Score < 0.5: the dispatch must be terminated.
    Block,
}

impl Recommendation {
    /// Derives the recommendation purely from the final score (§4.3, §8 property 3).
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < 0.5 {
            Self::Block
        } else if score < 0.85 {
            Self::Warn
        } else {
            Self::Allow
        }
    }
}

/// The scored output of one safety evaluation.
///
/// # Invariants
/// - `recommendation` is always `Recommendation::from_score(score)`; there is
///   no code path that sets it independently (§8 property 3).
/// - `score` is the product of 1.0 and every matched violation's penalty, so
///   it is always in `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    /// Final score after applying every matched rule's penalty.
    pub score: f64,
    /// Every rule that matched, in evaluation order.
    pub violations: Vec<Violation>,
    /// Free-form risk notes that do not themselves lower the score.
    pub risks: Vec<String>,
    /// The derived recommendation.
    pub recommendation: Recommendation,
}

impl SafetyVerdict {
    /// Builds a verdict from a final score and its violations, deriving the
    /// recommendation so callers cannot construct an inconsistent verdict.
    #[must_use]
    pub fn new(score: f64, violations: Vec<Violation>, risks: Vec<String>) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self { score, violations, risks, recommendation: Recommendation::from_score(score) }
    }

    /// Returns `true` iff the recommendation is [`Recommendation::Block`].
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.recommendation == Recommendation::Block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_below_half_blocks() {
        assert_eq!(Recommendation::from_score(0.49), Recommendation::Block);
    }

    #[test]
    fn score_at_half_warns() {
        assert_eq!(Recommendation::from_score(0.5), Recommendation::Warn);
    }

    #[test]
    fn score_at_eighty_five_allows() {
        assert_eq!(Recommendation::from_score(0.85), Recommendation::Allow);
    }

    #[test]
    fn verdict_derives_recommendation_from_score() {
        let verdict = SafetyVerdict::new(0.1, vec![], vec![]);
        assert!(verdict.is_blocked());
    }

    #[test]
    fn verdict_clamps_out_of_range_scores() {
        let verdict = SafetyVerdict::new(1.5, vec![], vec![]);
        assert_eq!(verdict.score, 1.0);
    }
}
