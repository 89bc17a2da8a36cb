// crates/wave-store/src/memory.rs
// ============================================================================
// Module: In-Memory Store and Bus
// Description: Single-process, non-durable implementations of the `Store`
//              and `Bus` capability traits.
// Purpose: Let unit tests and the dispatcher's own test suite exercise the
//          orchestration core without a filesystem, and let a single-process
//          deployment run without configuring SQLite (§4.1: "an in-memory
//          bus for tests and single-process deployments").
// Dependencies: wave-core, std::sync::Mutex
// ============================================================================

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use wave_core::Bus;
use wave_core::BusError;
use wave_core::Checkpoint;
use wave_core::Sequence;
use wave_core::Session;
use wave_core::SessionId;
use wave_core::SessionStatus;
use wave_core::Signal;
use wave_core::Store;
use wave_core::StoreError;

/// How many checkpoints are retained per session (§4.2 retention policy).
const RETAINED_CHECKPOINTS_PER_SESSION: usize = 5;

#[derive(Debug, Default)]
struct SessionState {
    checkpoints: VecDeque<Checkpoint>,
    signals: Vec<Signal>,
    status: SessionStatus,
}

/// A non-durable [`Store`] backed by an in-process `Mutex<HashMap<..>>`.
///
/// # Invariants
/// - Retains at most [`RETAINED_CHECKPOINTS_PER_SESSION`] checkpoints per
///   session, oldest evicted first, matching the durable store's policy.
/// - The audit log (`signals`) is never pruned; it is retained for the
///   lifetime of the process, mirroring "retained in full until session
///   close" for the durable backend.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: Mutex<HashMap<SessionId, SessionState>>,
}

impl InMemoryStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the session's current status so [`Store::list_resumable_sessions`]
    /// can enumerate it on "restart" (there is no real process restart for an
    /// in-memory store, but tests simulate one by dropping and recreating the
    /// orchestrator over the same `Arc<InMemoryStore>`).
    pub fn set_session_status(&self, session: &Session) {
        let mut sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        sessions.entry(session.id.clone()).or_default().status = session.status;
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save_checkpoint(&self, checkpoint: Checkpoint, triggering_signal: &Signal) -> Result<Sequence, StoreError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = sessions.entry(checkpoint.session_id.clone()).or_default();
        let sequence = checkpoint.sequence;
        // Both pushes happen under the same lock acquisition as the snapshot
        // write, so a reader never observes the checkpoint without its
        // triggering signal (§4.2's single-transaction invariant).
        state.signals.push(triggering_signal.clone());
        state.checkpoints.push_back(checkpoint);
        while state.checkpoints.len() > RETAINED_CHECKPOINTS_PER_SESSION {
            state.checkpoints.pop_front();
        }
        Ok(sequence)
    }

    async fn load_latest(&self, session_id: &SessionId) -> Result<Option<(Checkpoint, Vec<Signal>)>, StoreError> {
        let sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(state) = sessions.get(session_id) else {
            return Ok(None);
        };
        let Some(checkpoint) = state.checkpoints.back().cloned() else {
            return Ok(None);
        };
        let since = state.signals.iter().filter(|signal| signal.sequence > checkpoint.sequence).cloned().collect();
        Ok(Some((checkpoint, since)))
    }

    async fn append_audit(&self, signal: &Signal) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = sessions.entry(signal.session_id.clone()).or_default();
        state.signals.push(signal.clone());
        Ok(())
    }

    async fn list_resumable_sessions(&self) -> Result<Vec<SessionId>, StoreError> {
        let sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(sessions
            .iter()
            .filter(|(_, state)| matches!(state.status, SessionStatus::Running | SessionStatus::Paused))
            .map(|(id, _)| id.clone())
            .collect())
    }
}

/// A non-durable [`Bus`] backed by a per-session `Vec<Signal>` and an
/// acknowledgment watermark, both guarded by a single `Mutex`.
///
/// # Invariants
/// - `subscribe` always returns signals in strict sequence order (§4.1).
/// - `publish` never fails in this implementation: unavailability is a
///   property of a real transport, which an in-memory bus does not have.
#[derive(Debug, Default)]
pub struct InMemoryBus {
    sessions: Mutex<HashMap<SessionId, (Vec<Signal>, Sequence)>>,
}

impl InMemoryBus {
    /// Builds an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn publish(&self, signal: Signal) -> Result<(), BusError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        sessions.entry(signal.session_id.clone()).or_insert_with(|| (Vec::new(), Sequence::NONE)).0.push(signal);
        Ok(())
    }

    async fn subscribe(&self, session_id: &SessionId, from_sequence: Sequence) -> Result<Vec<Signal>, BusError> {
        let sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some((signals, _)) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        Ok(signals.iter().filter(|signal| signal.sequence > from_sequence).cloned().collect())
    }

    async fn acknowledge(&self, session_id: &SessionId, sequence: Sequence) -> Result<(), BusError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        sessions.entry(session_id.clone()).or_insert_with(|| (Vec::new(), Sequence::NONE)).1 = sequence;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave_core::ProjectId;
    use wave_core::SignalId;
    use wave_core::SignalKind;
    use wave_core::Timestamp;

    fn signal(session_id: &str, sequence: u64) -> Signal {
        Signal::new(
            SignalId::new(format!("sig-{sequence}")),
            SessionId::new(session_id),
            None,
            SignalKind::Heartbeat,
            "test",
            Timestamp::from_unix_millis(0),
            serde_json::Value::Null,
            Sequence::new(sequence),
        )
    }

    #[tokio::test]
    async fn publish_then_subscribe_recovers_exact_sequence() {
        let bus = InMemoryBus::new();
        for sequence in 1..=3 {
            bus.publish(signal("s1", sequence)).await.unwrap();
        }
        let signals = bus.subscribe(&SessionId::new("s1"), Sequence::NONE).await.unwrap();
        assert_eq!(signals.iter().map(|signal| signal.sequence.get()).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn subscribe_from_sequence_skips_already_seen() {
        let bus = InMemoryBus::new();
        for sequence in 1..=3 {
            bus.publish(signal("s1", sequence)).await.unwrap();
        }
        let signals = bus.subscribe(&SessionId::new("s1"), Sequence::new(1)).await.unwrap();
        assert_eq!(signals.len(), 2);
    }

    #[tokio::test]
    async fn checkpoint_store_retains_latest_five() {
        let store = InMemoryStore::new();
        for sequence in 1..=8u64 {
            let checkpoint = Checkpoint {
                session_id: SessionId::new("s1"),
                sequence: Sequence::new(sequence),
                gate: wave_core::Gate::DesignValidated,
                per_story_gate: std::collections::BTreeMap::new(),
                budget: wave_core::BudgetLedger::new(1_000),
                outstanding_dispatches: vec![],
                context_summary: wave_core::ContextSummary::default(),
                extra: serde_json::Value::Null,
                created_at: Timestamp::from_unix_millis(0),
            };
            store.save_checkpoint(checkpoint, &signal("s1", sequence)).await.unwrap();
        }
        let sessions = store.sessions.lock().unwrap();
        assert_eq!(sessions.get(&SessionId::new("s1")).unwrap().checkpoints.len(), 5);
    }

    #[tokio::test]
    async fn load_latest_returns_signals_since_checkpoint() {
        let store = InMemoryStore::new();
        let checkpoint = Checkpoint {
            session_id: SessionId::new("s1"),
            sequence: Sequence::new(1),
            gate: wave_core::Gate::DesignValidated,
            per_story_gate: std::collections::BTreeMap::new(),
            budget: wave_core::BudgetLedger::new(1_000),
            outstanding_dispatches: vec![],
            context_summary: wave_core::ContextSummary::default(),
            extra: serde_json::Value::Null,
            created_at: Timestamp::from_unix_millis(0),
        };
        store.save_checkpoint(checkpoint, &signal("s1", 1)).await.unwrap();
        store.append_audit(&signal("s1", 2)).await.unwrap();

        let (loaded, since) = store.load_latest(&SessionId::new("s1")).await.unwrap().unwrap();
        assert_eq!(loaded.sequence, Sequence::new(1));
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].sequence, Sequence::new(2));
    }

    #[tokio::test]
    async fn list_resumable_sessions_filters_by_status() {
        let store = InMemoryStore::new();
        let session = Session::new(SessionId::new("s1"), ProjectId::new("p"), 0, vec![], 1_000);
        store.set_session_status(&session);
        let mut running = session.clone();
        running.transition(SessionStatus::Running).unwrap();
        store.set_session_status(&running);

        let resumable = store.list_resumable_sessions().await.unwrap();
        assert_eq!(resumable, vec![SessionId::new("s1")]);
    }
}
