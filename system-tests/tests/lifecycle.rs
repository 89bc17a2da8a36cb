// system-tests/tests/lifecycle.rs
// ============================================================================
// Test: lifecycle
// Description: Drives a single story through every administrative and
//              worker gate from `DesignValidated` to `Deployed` with a
//              worker that always succeeds on its first turn.
// Purpose: Exercise the full dispatch loop end to end, the way §8 scenario
//          S1 describes, over a real orchestrator and in-memory backends.
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
async fn full_traversal_reaches_deployed() {
    let story = fixture_story("story-1");
    let worker = ScriptedWorker::new(vec![
        clean_turn("tests written"),
        clean_turn("dev started"),
        clean_turn("dev complete"),
        clean_turn("refactor complete"),
        clean_turn("qa passed"),
    ]);
    let runtime = Runtime::in_memory(fixture_runtime_config(3), Arc::new(worker));
    let bus = Arc::clone(&runtime.bus);
    let orchestrator = Arc::new(SessionOrchestrator::new(Arc::new(runtime)));

    let session_id = orchestrator
        .start_session(ProjectId::new("demo"), vec![story.clone()], "main".to_string())
        .expect("start_session should accept a fully configured story");

    let snapshot = wait_for(&orchestrator, &session_id, Duration::from_secs(5), |snapshot| {
        snapshot.status.is_terminal()
    })
    .await;

    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.per_story_gate.get(story.id.as_str()), Some(&Gate::Deployed));
    assert!(snapshot.budget.tokens_in > 0);

    let signals = bus.subscribe(&session_id, Sequence::NONE).await.expect("bus subscription should succeed");
    let started = signals.iter().filter(|signal| signal.kind == SignalKind::GateStarted).count();
    let completed = signals.iter().filter(|signal| signal.kind == SignalKind::GateCompleted).count();
    assert_eq!(started, 11, "6 administrative dispatches + 5 worker dispatches");
    assert_eq!(completed, 11);
    assert!(signals.iter().all(|signal| signal.kind != SignalKind::GateFailed));
}
