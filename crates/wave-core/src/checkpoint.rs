// crates/wave-core/src/checkpoint.rs
// ============================================================================
// Module: Checkpoint
// Description: An immutable snapshot of session state sufficient to resume
//              after a crash.
// Purpose: Give the checkpoint store (C2) and the session orchestrator (C10)
//          a single, hashable snapshot type whose equality captures "would
//          replay produce the same state" (§8 property 5).
// Dependencies: crate::{budget, gate, ids, time}, serde_json, sha2
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;

use crate::budget::BudgetLedger;
use crate::gate::Gate;
use crate::ids::SessionId;
use crate::ids::StoryId;
use crate::ids::Sequence;
use crate::time::Timestamp;

/// A checkpointed record of one outstanding (not yet resolved) dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingDispatch {
    /// The story being dispatched.
    pub story_id: StoryId,
    /// The gate this dispatch is working toward.
    pub gate: Gate,
    /// The workspace id allocated for this dispatch, if any.
    pub workspace_id: Option<String>,
}

/// A snapshot of the context governor's cache, sufficient to decide what to
/// reload on resume without carrying the full cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSummary {
    /// Keys currently pinned at checkpoint time.
    pub pinned_keys: Vec<String>,
    /// Total estimated tokens resident in the cache at checkpoint time.
    pub total_tokens: u64,
}

/// An immutable, transactionally-written snapshot of session state.
///
/// # Invariants
/// - `sequence` is monotone per session; the checkpoint store never accepts
///   a `save` with a sequence less than or equal to the latest stored one.
/// - Two checkpoints with equal fields are interchangeable for replay: this
///   is what makes `content_hash` useful as a fast equality/dedup check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The session this checkpoint belongs to.
    pub session_id: SessionId,
    /// Monotone sequence number of this checkpoint within the session.
    pub sequence: Sequence,
    /// The session-wide gate reached (the minimum gate across all stories,
    /// or the single story's gate for single-story sessions).
    pub gate: Gate,
    /// Per-story gate map: story id -> gate currently reached.
    pub per_story_gate: BTreeMap<String, Gate>,
    /// The budget ledger at the time of this checkpoint.
    pub budget: BudgetLedger,
    /// Dispatches that were outstanding (neither completed nor failed) at
    /// checkpoint time.
    pub outstanding_dispatches: Vec<OutstandingDispatch>,
    /// A summary of the context governor's cache.
    pub context_summary: ContextSummary,
    /// Arbitrary additional state a specific deployment wants to carry,
    /// opaque to the core (e.g. retry counters keyed by story).
    pub extra: Value,
    /// When this checkpoint was written.
    pub created_at: Timestamp,
}

impl Checkpoint {
    /// A stable content hash over every field except `created_at`, useful for
    /// detecting whether two checkpoints represent the same logical state
    /// even if they were written at different wall-clock times.
    ///
    /// # Panics
    /// Panics only if the checkpoint itself is not serializable, which would
    /// indicate a bug in one of its field types rather than bad input data.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let canonical = serde_jcs::to_string(&(
            &self.session_id,
            &self.sequence,
            &self.gate,
            &self.per_story_gate,
            &self.budget,
            &self.outstanding_dispatches,
            &self.context_summary,
            &self.extra,
        ))
        .unwrap_or_else(|err| unreachable!("checkpoint fields are always JSON-serializable: {err}"));
        let digest = Sha256::digest(canonical.as_bytes());
        format!("{digest:x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Checkpoint {
        Checkpoint {
            session_id: SessionId::new("sess-1"),
            sequence: Sequence::new(3),
            gate: Gate::DevComplete,
            per_story_gate: BTreeMap::new(),
            budget: BudgetLedger::new(1_000_000),
            outstanding_dispatches: vec![],
            context_summary: ContextSummary::default(),
            extra: Value::Null,
            created_at: Timestamp::from_unix_millis(0),
        }
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = sample();
        let b = sample();
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn content_hash_ignores_created_at() {
        let a = sample();
        let mut b = sample();
        b.created_at = Timestamp::from_unix_millis(99_999);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn content_hash_changes_with_gate() {
        let a = sample();
        let mut b = sample();
        b.gate = Gate::QaPassed;
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
