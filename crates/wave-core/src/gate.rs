// crates/wave-core/src/gate.rs
// ============================================================================
// Module: Gate State Machine
// Description: The twelve canonical lifecycle gates and their ordering rules.
// Purpose: Enforce that a story advances exactly one gate at a time, in the
//          fixed canonical order, with no skipping and no reordering.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A prior design encoded gates as bare integers and advanced by arithmetic;
//! inserting `TESTS_WRITTEN` between `PLAN_APPROVED` and `DEV_STARTED` (and
//! `REFACTOR_COMPLETE` between `DEV_COMPLETE` and `QA_PASSED`) silently broke
//! that arithmetic. [`Gate`] is instead an explicit ordered enum, and
//! [`GateSequence`] resolves "what comes next" and "is this transition legal"
//! by looking the gate up in the canonical list — inserting a gate later only
//! requires inserting a new variant, not re-deriving index arithmetic.

use serde::Deserialize;
use serde::Serialize;

/// One of the twelve canonical lifecycle checkpoints a story passes through.
///
/// # Invariants
/// - [`Gate::CANONICAL_ORDER`] is the only valid ordering; no other sequence
///   of variants is a legal transition path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gate {
    /// Design has been reviewed and validated before any story work starts.
    DesignValidated,
    /// The story has been assigned a role and domain.
    StoryAssigned,
    /// A dispatch plan for the story has been approved.
    PlanApproved,
    /// Tests have been written before any implementation code (test-before-code).
    TestsWritten,
    /// Development work has started.
    DevStarted,
    /// Development work is complete.
    DevComplete,
    /// Refactoring pass is complete, ahead of QA.
    RefactorComplete,
    /// QA has validated the story against its acceptance criteria.
    QaPassed,
    /// The safety evaluator has cleared the story's changes.
    SafetyCleared,
    /// A human or automated reviewer has approved the change.
    ReviewApproved,
    /// The change has been merged into the mainline branch.
    Merged,
    /// The change has been deployed.
    Deployed,
}

impl Gate {
    /// The fixed canonical order every story must traverse, index 0 first.
    pub const CANONICAL_ORDER: [Self; 12] = [
        Self::DesignValidated,
        Self::StoryAssigned,
        Self::PlanApproved,
        Self::TestsWritten,
        Self::DevStarted,
        Self::DevComplete,
        Self::RefactorComplete,
        Self::QaPassed,
        Self::SafetyCleared,
        Self::ReviewApproved,
        Self::Merged,
        Self::Deployed,
    ];

    /// The first gate a new story starts at.
    #[must_use]
    pub const fn first() -> Self {
        Self::DesignValidated
    }

    /// The terminal gate; reaching it completes the story.
    #[must_use]
    pub const fn terminal() -> Self {
        Self::Deployed
    }

    /// Returns `true` iff this is the terminal gate.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::terminal()
    }

    /// This gate's zero-based index in [`Gate::CANONICAL_ORDER`].
    #[must_use]
    pub fn index(self) -> usize {
        Self::CANONICAL_ORDER
            .iter()
            .position(|gate| *gate == self)
            .unwrap_or_else(|| unreachable!("Gate::CANONICAL_ORDER covers every variant"))
    }

    /// The gate that canonically follows this one, or `None` at the terminal gate.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::CANONICAL_ORDER.get(self.index() + 1).copied()
    }

    /// A human-readable, stable name (matches the serde wire form).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::DesignValidated => "DESIGN_VALIDATED",
            Self::StoryAssigned => "STORY_ASSIGNED",
            Self::PlanApproved => "PLAN_APPROVED",
            Self::TestsWritten => "TESTS_WRITTEN",
            Self::DevStarted => "DEV_STARTED",
            Self::DevComplete => "DEV_COMPLETE",
            Self::RefactorComplete => "REFACTOR_COMPLETE",
            Self::QaPassed => "QA_PASSED",
            Self::SafetyCleared => "SAFETY_CLEARED",
            Self::ReviewApproved => "REVIEW_APPROVED",
            Self::Merged => "MERGED",
            Self::Deployed => "DEPLOYED",
        }
    }
}

/// Error returned when a requested gate transition is not the canonical next gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("gate transition {from:?} -> {requested:?} is not canonical; expected {expected:?}")]
pub struct GateViolation {
    /// The gate the story was at before the requested transition.
    pub from: Gate,
    /// The gate the caller asked to transition to.
    pub requested: Gate,
    /// The only legal next gate, if any (`None` means `from` is terminal).
    pub expected: Option<Gate>,
}

/// Validates and computes gate transitions against the canonical order.
///
/// This type holds no state; it is a pure function wrapper kept as a struct
/// so call sites read as `GateSequence::validate(...)` next to the other
/// component contracts in this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateSequence;

impl GateSequence {
    /// Returns the canonical next gate after `current`.
    #[must_use]
    pub fn next(current: Gate) -> Option<Gate> {
        current.next()
    }

    /// Validates that `requested` is the canonical successor of `current`.
    ///
    /// # Errors
    /// Returns [`GateViolation`] if `requested` is any gate other than
    /// `current.next()` (including transitioning past the terminal gate, or
    /// skipping/reordering gates).
    pub fn validate(current: Gate, requested: Gate) -> Result<(), GateViolation> {
        let expected = current.next();
        if Some(requested) == expected {
            Ok(())
        } else {
            Err(GateViolation { from: current, requested, expected })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Gate;
    use super::GateSequence;

    #[test]
    fn canonical_order_has_twelve_gates_starting_at_design_validated() {
        assert_eq!(Gate::CANONICAL_ORDER.len(), 12);
        assert_eq!(Gate::CANONICAL_ORDER[0], Gate::first());
        assert_eq!(Gate::CANONICAL_ORDER[11], Gate::terminal());
    }

    #[test]
    fn tests_written_precedes_dev_started() {
        assert_eq!(Gate::TestsWritten.next(), Some(Gate::DevStarted));
    }

    #[test]
    fn refactor_complete_precedes_qa_passed() {
        assert_eq!(Gate::RefactorComplete.next(), Some(Gate::QaPassed));
    }

    #[test]
    fn terminal_gate_has_no_next() {
        assert_eq!(Gate::Deployed.next(), None);
        assert!(Gate::Deployed.is_terminal());
    }

    #[test]
    fn validate_accepts_canonical_step() {
        assert!(GateSequence::validate(Gate::DevComplete, Gate::RefactorComplete).is_ok());
    }

    #[test]
    fn validate_rejects_skip() {
        let err = GateSequence::validate(Gate::PlanApproved, Gate::DevStarted).unwrap_err();
        assert_eq!(err.expected, Some(Gate::TestsWritten));
    }

    #[test]
    fn validate_rejects_reorder() {
        let err = GateSequence::validate(Gate::QaPassed, Gate::DevComplete).unwrap_err();
        assert_eq!(err.from, Gate::QaPassed);
    }

    #[test]
    fn validate_rejects_transition_past_terminal() {
        let err = GateSequence::validate(Gate::Deployed, Gate::Deployed).unwrap_err();
        assert_eq!(err.expected, None);
    }
}
