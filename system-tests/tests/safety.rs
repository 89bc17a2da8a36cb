// system-tests/tests/safety.rs
// ============================================================================
// Test: safety
// Description: A worker that keeps proposing a destructive shell command
//              exhausts the retry ceiling and the session parks itself
//              rather than ever reaching a later gate.
// Purpose: Exercise the safety-block escalation path end to end (§8 scenario
//          S2, driven through the full dispatcher/orchestrator rather than
//          `wave_safety::evaluate` in isolation).
// ============================================================================

#![cfg(feature = "system-tests")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_docs_in_private_items,
    missing_docs,
    reason = "Integration test binary; assertions panic by design."
)]

use std::sync::Arc;
use std::time::Duration;

use system_tests::ScriptedWorker;
use system_tests::clean_turn;
use system_tests::destructive_turn;
use system_tests::fixture_runtime_config;
use system_tests::fixture_story;
use system_tests::wait_for;
use wave_core::Gate;
use wave_core::ProjectId;
use wave_core::Sequence;
use wave_core::SessionStatus;
use wave_core::SignalKind;
use wave_server::Runtime;
use wave_server::SessionOrchestrator;

#[tokio::test]
async fn repeated_destructive_command_escalates_and_pauses() {
    let story = fixture_story("story-1");
    let mut turns = vec![clean_turn("tests written")];
    turns.extend((0..7).map(|_| destructive_turn("rm -rf /")));
    let worker = ScriptedWorker::new(turns);

    let runtime = Runtime::in_memory(fixture_runtime_config(3), Arc::new(worker));
    let bus = Arc::clone(&runtime.bus);
    let orchestrator = Arc::new(SessionOrchestrator::new(Arc::new(runtime)));

    let session_id = orchestrator
        .start_session(ProjectId::new("demo"), vec![story.clone()], "main".to_string())
        .expect("start_session should accept a fully configured story");

    let snapshot = wait_for(&orchestrator, &session_id, Duration::from_secs(5), |snapshot| {
        snapshot.status.is_terminal() || snapshot.status == SessionStatus::Paused
    })
    .await;

    assert_eq!(snapshot.status, SessionStatus::Paused);
    assert_eq!(snapshot.per_story_gate.get(story.id.as_str()), Some(&Gate::TestsWritten));

    let signals = bus.subscribe(&session_id, Sequence::NONE).await.expect("bus subscription should succeed");
    let count = |kind: SignalKind| signals.iter().filter(|signal| signal.kind == kind).count();
    assert_eq!(count(SignalKind::Escalation), 1, "the retry ceiling is hit exactly once");
    assert!(count(SignalKind::GateFailed) >= 1);
    assert_eq!(count(SignalKind::EmergencyStop), 0, "rm -rf / matches the destructive-command category, not a story stop condition");
}
