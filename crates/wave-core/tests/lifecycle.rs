// crates/wave-core/tests/lifecycle.rs
// Integration coverage across gate, session, story, signal, and checkpoint
// types together, the way the session orchestrator actually drives them.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "integration test assertions")]

use std::collections::BTreeMap;

use wave_core::Checkpoint;
use wave_core::ContextSummary;
use wave_core::Domain;
use wave_core::FilePolicy;
use wave_core::Gate;
use wave_core::GateSequence;
use wave_core::Objective;
use wave_core::ProjectId;
use wave_core::Role;
use wave_core::Sequence;
use wave_core::Session;
use wave_core::SessionId;
use wave_core::SessionStatus;
use wave_core::Signal;
use wave_core::SignalId;
use wave_core::SignalKind;
use wave_core::Story;
use wave_core::StoryId;
use wave_core::StoryThresholds;
use wave_core::Timestamp;

fn story(id: &str) -> Story {
    Story {
        id: StoryId::new(id),
        project: ProjectId::new("demo"),
        title: "Add session refresh".to_string(),
        domain: Domain::new("AUTH"),
        role: Role::new("backend-1"),
        wave: 1,
        objective: Objective {
            as_a: "user".to_string(),
            i_want: "my session to refresh".to_string(),
            so_that: "I stay logged in".to_string(),
        },
        acceptance_criteria: vec![
            "refresh returns 200 on valid token".to_string(),
            "refresh returns 401 on expired token".to_string(),
            "refresh rotates the refresh token".to_string(),
        ],
        files: FilePolicy {
            create: vec!["src/auth/refresh.rs".to_string()],
            modify: vec![],
            forbidden: vec!["src/billing/".to_string()],
        },
        stop_conditions: vec![
            "no plaintext secret in logs".to_string(),
            "no disabled auth check".to_string(),
            "no removed rate limit".to_string(),
        ],
        thresholds: StoryThresholds { max_tokens: 200_000, max_cost_micros: 5_000_000, max_duration_minutes: 30 },
    }
}

#[test]
fn a_story_walks_every_gate_in_canonical_order() {
    let mut current = Gate::first();
    let mut visited = vec![current];
    while let Some(next) = GateSequence::next(current) {
        GateSequence::validate(current, next).expect("canonical step must validate");
        current = next;
        visited.push(current);
    }
    assert_eq!(visited.len(), 12);
    assert_eq!(*visited.last().expect("non-empty"), Gate::terminal());
}

#[test]
fn session_runs_through_completion_and_refuses_further_transitions() {
    let story = story("AUTH-1");
    assert!(story.validate().is_ok());

    let mut session = Session::new(SessionId::new("sess-1"), ProjectId::new("demo"), 0, vec![story], 10_000_000);
    session.transition(SessionStatus::Running).expect("pending -> running");
    session.transition(SessionStatus::Completed).expect("running -> completed");
    assert!(session.status.is_terminal());
    assert!(session.transition(SessionStatus::Running).is_err());
}

#[test]
fn a_gate_completed_signal_and_checkpoint_agree_on_sequence() {
    let session_id = SessionId::new("sess-1");
    let sequence = Sequence::new(1);
    let signal = Signal::new(
        SignalId::new("sig-1"),
        session_id.clone(),
        Some(StoryId::new("AUTH-1")),
        SignalKind::GateCompleted,
        "dispatcher".to_string(),
        Timestamp::from_unix_millis(1_000),
        serde_json::json!({ "gate": "DEV_STARTED" }),
        sequence,
    );

    let mut per_story_gate = BTreeMap::new();
    per_story_gate.insert("AUTH-1".to_string(), Gate::DevStarted);

    let checkpoint = Checkpoint {
        session_id,
        sequence,
        gate: Gate::DevStarted,
        per_story_gate,
        budget: wave_core::BudgetLedger::new(10_000_000),
        outstanding_dispatches: vec![],
        context_summary: ContextSummary::default(),
        extra: serde_json::Value::Null,
        created_at: Timestamp::from_unix_millis(1_000),
    };

    assert_eq!(signal.sequence, checkpoint.sequence);
    let replayed = checkpoint.clone();
    assert_eq!(checkpoint.content_hash(), replayed.content_hash());
}
