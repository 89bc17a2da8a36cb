// crates/wave-core/src/error.rs
// ============================================================================
// Module: Core Error Taxonomy
// Description: The top-level error categories from §7, unified so the
//              session orchestrator can match on handling policy rather than
//              on a specific component's error type.
// Purpose: Every error the orchestrator surfaces becomes a signal and a
//          status change (§7: "no error is silently swallowed"); this type
//          is what gets wrapped into that signal's payload.
// Dependencies: crate::{capability, gate, story}
// ============================================================================

use crate::capability::BusError;
use crate::capability::StoreError;
use crate::capability::VcsError;
use crate::capability::WorkerError;
use crate::gate::GateViolation;

/// The handling-policy category an error falls into (§7).
///
/// # Invariants
/// - Every variant maps to exactly one handling policy; the orchestrator
///   switches on this enum, not on the wrapped error's own type, so adding a
///   new underlying error type never requires new orchestrator branches as
///   long as it's wrapped into an existing category.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Transient infrastructure failure (bus or store unavailable); retried
    /// locally with exponential backoff before surfacing.
    #[error("transient infrastructure error: {0}")]
    TransientInfrastructure(String),
    /// The external worker crashed, exited non-zero, or timed out.
    #[error("worker failed: {0}")]
    WorkerFailure(#[from] WorkerError),
    /// The safety evaluator blocked the dispatch.
    #[error("safety block: score {score} below threshold")]
    SafetyBlock {
        /// The score that triggered the block.
        score: f64,
    },
    /// A write fell outside the story's allow-list or inside its deny-list.
    #[error("boundary violation: {0} path(s) outside policy")]
    BoundaryViolation(usize),
    /// A budget cap was exceeded.
    #[error("budget exceeded")]
    BudgetExceeded,
    /// An attempted gate transition was not the canonical next gate: a
    /// programmer error, not a runtime condition to recover from.
    #[error("state machine violation: {0}")]
    StateMachineViolation(#[from] GateViolation),
    /// A checkpoint failed to load or violated an invariant on read.
    #[error("corrupt checkpoint: {0}")]
    CorruptCheckpoint(String),
}

impl From<BusError> for CoreError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Unavailable(reason) => Self::TransientInfrastructure(reason),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => Self::TransientInfrastructure(reason),
            StoreError::Corrupt { session_id, reason } => {
                Self::CorruptCheckpoint(format!("session {session_id}: {reason}"))
            }
        }
    }
}

impl From<VcsError> for CoreError {
    fn from(err: VcsError) -> Self {
        Self::TransientInfrastructure(err.to_string())
    }
}

impl CoreError {
    /// Returns `true` iff this error category is meant to be retried locally
    /// rather than immediately surfaced as a session status change (§7).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientInfrastructure(_))
    }
}
