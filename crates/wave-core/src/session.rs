// crates/wave-core/src/session.rs
// ============================================================================
// Module: Session
// Description: The top-level unit of work: a project, its stories, and their
//              cumulative budget and checkpoint state.
// Purpose: Carry the fields the session orchestrator (C10) mutates under a
//          session lock; this type holds no behavior of its own beyond
//          simple status transitions, by design (cyclic calls back into the
//          orchestrator are replaced by signals, per §9).
// Dependencies: crate::{budget, ids, story}, serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::budget::BudgetLedger;
use crate::ids::ProjectId;
use crate::ids::SessionId;
use crate::ids::Sequence;
use crate::story::Story;

/// The lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Submitted but not yet started.
    Pending,
    /// Actively being driven gate-by-gate.
    Running,
    /// Paused (budget exceeded, transient-infra backoff exhausted, or operator request).
    Paused,
    /// Every story reached the terminal gate.
    Completed,
    /// Terminated by an unrecoverable error (state-machine violation, corrupt checkpoint).
    Failed,
    /// Terminated by an emergency stop.
    Aborted,
}

impl SessionStatus {
    /// Returns `true` iff this status is terminal (no further transitions expected).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

/// Error returned by an illegal session status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot transition session from {from:?} to {to:?}")]
pub struct SessionTransitionError {
    /// The status before the attempted transition.
    pub from: SessionStatus,
    /// The status the caller attempted to transition to.
    pub to: SessionStatus,
}

/// The top-level unit of work: a project, its stories, and their cumulative
/// budget and checkpoint pointer.
///
/// # Invariants
/// - Mutated only by the session orchestrator under a session lock (§3); no
///   other component holds a mutable reference across an `await` point.
/// - `stories` is append-only after submission: the story set for a session
///   is fixed at `start-session` time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,
    /// The project this session operates on.
    pub project: ProjectId,
    /// When the session was created, as Unix millis (kept as a primitive so
    /// `Session` stays plain-data; callers timestamp it via a `Clock`).
    pub created_at_millis: i64,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// The stories submitted with this session.
    pub stories: Vec<Story>,
    /// Cumulative budget ledger across every story and dispatch.
    pub budget: BudgetLedger,
    /// Sequence number of the latest durable checkpoint, if any.
    pub latest_checkpoint: Sequence,
}

impl Session {
    /// Builds a new, pending session with an empty budget ledger.
    #[must_use]
    pub fn new(id: SessionId, project: ProjectId, created_at_millis: i64, stories: Vec<Story>, cap_micros: u64) -> Self {
        Self {
            id,
            project,
            created_at_millis,
            status: SessionStatus::Pending,
            stories,
            budget: BudgetLedger::new(cap_micros),
            latest_checkpoint: Sequence::NONE,
        }
    }

    /// Attempts to transition the session to a new status.
    ///
    /// # Errors
    /// Returns [`SessionTransitionError`] if `to` is unreachable from the
    /// current status: terminal statuses never transition further, and a
    /// session cannot resume directly into `Completed`/`Failed`/`Aborted`
    /// without the orchestrator observing the corresponding signal first.
    pub fn transition(&mut self, to: SessionStatus) -> Result<(), SessionTransitionError> {
        let allowed = match self.status {
            SessionStatus::Pending => matches!(to, SessionStatus::Running | SessionStatus::Aborted),
            SessionStatus::Running => {
                matches!(to, SessionStatus::Paused | SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Aborted)
            }
            SessionStatus::Paused => matches!(to, SessionStatus::Running | SessionStatus::Aborted | SessionStatus::Failed),
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Aborted => false,
        };
        if allowed {
            self.status = to;
            Ok(())
        } else {
            Err(SessionTransitionError { from: self.status, to })
        }
    }

    /// Looks up a story by id.
    #[must_use]
    pub fn story(&self, story_id: &crate::ids::StoryId) -> Option<&Story> {
        self.stories.iter().find(|story| &story.id == story_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(SessionId::new("s-1"), ProjectId::new("demo"), 0, vec![], 1_000_000)
    }

    #[test]
    fn pending_session_can_start_running() {
        let mut session = session();
        assert!(session.transition(SessionStatus::Running).is_ok());
    }

    #[test]
    fn terminal_status_accepts_no_further_transitions() {
        let mut session = session();
        session.transition(SessionStatus::Running).unwrap();
        session.transition(SessionStatus::Completed).unwrap();
        let err = session.transition(SessionStatus::Running).unwrap_err();
        assert_eq!(err.from, SessionStatus::Completed);
    }

    #[test]
    fn pending_cannot_jump_to_completed() {
        let mut session = session();
        assert!(session.transition(SessionStatus::Completed).is_err());
    }

    #[test]
    fn emergency_stop_aborts_from_any_non_terminal_status() {
        let mut session = session();
        assert!(session.transition(SessionStatus::Aborted).is_ok());
    }
}
