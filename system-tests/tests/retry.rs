// system-tests/tests/retry.rs
// ============================================================================
// Test: retry
// Description: A QA rejection dispatches the `{role}-fix` role once, which
//              then succeeds, and the story still reaches `Deployed`.
// Purpose: Exercise the retry controller's redispatch path (§8 scenario S5)
//          rather than only its escalation path.
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
async fn qa_rejection_retries_then_succeeds() {
    let story = fixture_story("story-1");
    let worker = ScriptedWorker::new(vec![
        clean_turn("tests written"),
        clean_turn("dev started"),
        clean_turn("dev complete"),
        clean_turn("refactor complete"),
        clean_turn("qa rejected: missing coverage"),
        clean_turn("fix applied"),
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

    let signals = bus.subscribe(&session_id, Sequence::NONE).await.expect("bus subscription should succeed");
    let count = |kind: SignalKind| signals.iter().filter(|signal| signal.kind == kind).count();
    assert_eq!(count(SignalKind::QaRejected), 1);
    assert_eq!(count(SignalKind::RetryRequested), 1);
    assert_eq!(count(SignalKind::FixCompleted), 1);
    assert_eq!(count(SignalKind::QaApproved), 1);
    assert_eq!(count(SignalKind::Escalation), 0, "a retry below the attempt ceiling must not escalate");
}
