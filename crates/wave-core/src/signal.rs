// crates/wave-core/src/signal.rs
// ============================================================================
// Module: Signal
// Description: The durable, ordered event type published on the signal bus.
// Purpose: Give every component a single versioned event shape to publish
//          and consume; signals are never deleted and form the session audit
//          log (§3).
// Dependencies: crate::ids, crate::time, serde_json
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ids::SessionId;
use crate::ids::SignalId;
use crate::ids::StoryId;
use crate::ids::Sequence;
use crate::time::Timestamp;

/// The enumerated kinds of signal a component may publish.
///
/// Consumers must ignore unknown kinds rather than erroring, so a future
/// version of this enum can add variants without breaking an older consumer
/// mid-rollout. `#[serde(other)]` on [`SignalKind::Unknown`] implements that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    /// A gate's dispatch has started.
    GateStarted,
    /// A gate's dispatch completed successfully.
    GateCompleted,
    /// A gate's dispatch failed (safety block, boundary violation, worker crash).
    GateFailed,
    /// QA approved the story's changes.
    QaApproved,
    /// QA rejected the story's changes.
    QaRejected,
    /// The retry controller issued a fix dispatch.
    RetryRequested,
    /// A fix dispatch completed.
    FixCompleted,
    /// The retry controller exhausted its attempts and escalated to a human.
    Escalation,
    /// An operator triggered an emergency stop.
    EmergencyStop,
    /// A periodic liveness signal from a long-running dispatch.
    Heartbeat,
    /// A budget threshold (50/75/90%) was crossed.
    BudgetWarning,
    /// A story or session budget cap (100%) was exceeded; the worker was terminated.
    BudgetExceeded,
    /// A dispatch was terminated after making no progress within its timeout.
    Timeout,
    /// A signal kind not recognized by this build; preserved for forward compatibility.
    #[serde(other)]
    Unknown,
}

/// A durable event on the per-session signal bus.
///
/// # Invariants
/// - `sequence` is strictly increasing within a session and never reused.
/// - Signals are append-only: once published, a signal is never mutated or
///   deleted (it is the session's audit log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Unique identifier for this signal.
    pub id: SignalId,
    /// Session this signal belongs to.
    pub session_id: SessionId,
    /// Story this signal concerns, if any (some signals are session-wide).
    pub story_id: Option<StoryId>,
    /// The kind of event.
    pub kind: SignalKind,
    /// The component or agent that produced this signal.
    pub producer: String,
    /// When the signal was produced.
    pub timestamp: Timestamp,
    /// Structured, kind-specific payload.
    pub payload: Value,
    /// Monotonically increasing sequence number within the session.
    pub sequence: Sequence,
}

impl Signal {
    /// Builds a signal with the next sequence number, setting `story_id` and `payload`.
    #[must_use]
    pub fn new(
        id: SignalId,
        session_id: SessionId,
        story_id: Option<StoryId>,
        kind: SignalKind,
        producer: impl Into<String>,
        timestamp: Timestamp,
        payload: Value,
        sequence: Sequence,
    ) -> Self {
        Self { id, session_id, story_id, kind, producer: producer.into(), timestamp, payload, sequence }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_signal_kind_deserializes_instead_of_erroring() {
        let json = r#""some-future-kind""#;
        let kind: SignalKind = serde_json::from_str(json).unwrap();
        assert_eq!(kind, SignalKind::Unknown);
    }

    #[test]
    fn known_kind_round_trips() {
        let json = serde_json::to_string(&SignalKind::QaRejected).unwrap();
        assert_eq!(json, "\"qa-rejected\"");
    }
}
