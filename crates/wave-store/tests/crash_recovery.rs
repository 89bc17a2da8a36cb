// crates/wave-store/tests/crash_recovery.rs
// ============================================================================
// Integration test: crash-recovery replay against a real SQLite file.
// Grounded in scenario S6 ("a session is killed mid-dispatch and resumed"):
// a checkpoint and the signals published after it must both survive a
// process restart, and the session must be rediscoverable as resumable.
// ============================================================================

use std::collections::BTreeMap;

use wave_core::BudgetLedger;
use wave_core::Bus;
use wave_core::Checkpoint;
use wave_core::ContextSummary;
use wave_core::Gate;
use wave_core::Sequence;
use wave_core::SessionId;
use wave_core::Signal;
use wave_core::SignalId;
use wave_core::SignalKind;
use wave_core::Store;
use wave_core::Timestamp;
use wave_store::sqlite;
use wave_store::sqlite::SESSION_STATUS_EXTRA_KEY;

fn checkpoint(session_id: &str, sequence: u64, gate: Gate) -> Checkpoint {
    Checkpoint {
        session_id: SessionId::new(session_id),
        sequence: Sequence::new(sequence),
        gate,
        per_story_gate: BTreeMap::new(),
        budget: BudgetLedger::new(10_000_000),
        outstanding_dispatches: vec![],
        context_summary: ContextSummary::default(),
        extra: serde_json::json!({ SESSION_STATUS_EXTRA_KEY: "running" }),
        created_at: Timestamp::from_unix_millis(0),
    }
}

fn signal(session_id: &str, sequence: u64) -> Signal {
    Signal::new(
        SignalId::new(format!("sig-{sequence}")),
        SessionId::new(session_id),
        None,
        SignalKind::GateCompleted,
        "dispatcher",
        Timestamp::from_unix_millis(0),
        serde_json::Value::Null,
        Sequence::new(sequence),
    )
}

#[tokio::test]
async fn checkpoint_and_signals_survive_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("wave.db");

    {
        let (store, bus) = sqlite::open(&db_path).unwrap();
        store.save_checkpoint(checkpoint("s1", 1, Gate::DevStarted), &signal("s1", 1)).await.unwrap();
        bus.publish(signal("s1", 2)).await.unwrap();
        bus.publish(signal("s1", 3)).await.unwrap();
        // store and bus, and the writer thread they share, are dropped here,
        // simulating process exit.
    }

    let (store, bus) = sqlite::open(&db_path).unwrap();
    let (loaded, since) = store.load_latest(&SessionId::new("s1")).await.unwrap().unwrap();
    assert_eq!(loaded.gate, Gate::DevStarted);
    assert_eq!(since.len(), 2);
    assert_eq!(since[0].sequence, Sequence::new(2));
    assert_eq!(since[1].sequence, Sequence::new(3));

    let resumable = store.list_resumable_sessions().await.unwrap();
    assert_eq!(resumable, vec![SessionId::new("s1")]);

    // The checkpoint's own triggering signal (sequence 1) was written inside
    // the same transaction as the snapshot, so it survives the restart
    // alongside the two signals published directly to the bus.
    let replayed = bus.subscribe(&SessionId::new("s1"), Sequence::NONE).await.unwrap();
    assert_eq!(replayed.len(), 3);
}

#[tokio::test]
async fn a_completed_session_is_not_listed_as_resumable_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("wave.db");

    {
        let (store, _bus) = sqlite::open(&db_path).unwrap();
        store.save_checkpoint(checkpoint("s1", 1, Gate::DevStarted), &signal("s1", 1)).await.unwrap();
        let mut completed = checkpoint("s1", 2, Gate::Deployed);
        completed.extra = serde_json::json!({ SESSION_STATUS_EXTRA_KEY: "completed" });
        store.save_checkpoint(completed, &signal("s1", 2)).await.unwrap();
    }

    let (store, _bus) = sqlite::open(&db_path).unwrap();
    let resumable = store.list_resumable_sessions().await.unwrap();
    assert!(resumable.is_empty());
}
