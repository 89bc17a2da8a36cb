// system-tests/src/lib.rs
// ============================================================================
// Module: WAVE System Tests Library
// Description: Shared fixtures and a scripted worker double for the
//              end-to-end scenarios in `system-tests/tests`.
// Purpose: Give every system-test binary the same story/runtime fixtures and
//          a single scripted `Worker` so each scenario only has to script
//          the turns it cares about, not reimplement the double.
// Dependencies: wave-core, wave-config, wave-dispatch, wave-server, wave-store
// ============================================================================

//! ## Overview
//! These end-to-end scenarios drive a real [`wave_server::SessionOrchestrator`]
//! over in-memory backends with a scripted [`wave_core::Worker`], the way
//! `wave-server`'s own HTTP tests do, but without the HTTP layer in between:
//! `start_session` is called directly and the session's driver thread is
//! observed through `get_session` polling, since the orchestrator drives
//! each session on its own OS thread rather than synchronously.

#![allow(
    clippy::missing_docs_in_private_items,
    clippy::panic,
    reason = "Test-support helpers keep documentation concise and panic on timeout by design."
)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use wave_core::Domain;
use wave_core::FilePolicy;
use wave_core::ModelRate;
use wave_core::Objective;
use wave_core::ProjectId;
use wave_core::Role;
use wave_core::SessionId;
use wave_core::Story;
use wave_core::StoryId;
use wave_core::StoryThresholds;
use wave_core::Worker;
use wave_core::WorkerError;
use wave_core::WorkerExit;
use wave_core::WorkerTurn;
use wave_config::RuntimeConfig;
use wave_server::OrchestratorError;
use wave_server::SessionOrchestrator;
use wave_server::SessionSnapshot;

/// The role every fixture story assigns, for fix-dispatch role matching
/// against the orchestrator's own `{role}-fix` convention.
pub const FIXTURE_ROLE: &str = "backend-1";
/// The model id fixture runtimes assign to [`FIXTURE_ROLE`].
pub const FIXTURE_MODEL: &str = "gpt-x";

/// A single-story, `SHARED`-domain fixture with a generous token/cost/time
/// budget, so a scenario's scripted worker is the only thing that can make
/// it fail a gate.
#[must_use]
pub fn fixture_story(story_id: &str) -> Story {
    Story {
        id: StoryId::new(story_id),
        project: ProjectId::new("demo"),
        title: "Ship the login flow".to_string(),
        domain: Domain::new("AUTH"),
        role: Role::new(FIXTURE_ROLE),
        wave: 1,
        objective: Objective {
            as_a: "user".to_string(),
            i_want: "to log in".to_string(),
            so_that: "I can reach my account".to_string(),
        },
        acceptance_criteria: vec!["form validates credentials".to_string(), "session token issued".to_string(), "failed login is rejected".to_string()],
        files: FilePolicy { create: vec!["src/auth/".to_string()], modify: vec![], forbidden: vec!["secrets/".to_string()] },
        stop_conditions: vec!["credentials logged in plaintext".to_string(), "auth bypass introduced".to_string(), "session store deleted".to_string()],
        thresholds: StoryThresholds { max_tokens: 1_000_000, max_cost_micros: 1_000_000_000, max_duration_minutes: 30 },
    }
}

/// A [`RuntimeConfig`] over in-memory backends with [`FIXTURE_ROLE`] mapped
/// to [`FIXTURE_MODEL`] at a nominal rate, and `default_max_retry_attempts`
/// overridable per scenario.
#[must_use]
pub fn fixture_runtime_config(max_retry_attempts: u32) -> RuntimeConfig {
    RuntimeConfig {
        models: [(FIXTURE_ROLE.to_string(), FIXTURE_MODEL.to_string())].into_iter().collect(),
        rates: [(FIXTURE_MODEL.to_string(), ModelRate { input_micros_per_1k: 1, output_micros_per_1k: 1 })].into_iter().collect(),
        budget: wave_config::BudgetConfig { session_cap_micros: 1_000_000_000, default_max_retry_attempts: max_retry_attempts },
        ..RuntimeConfig::default()
    }
}

/// One scripted response, queued in invocation order. The dispatcher may
/// invoke a worker more than once per gate if a turn is not `done`; every
/// scenario in this crate scripts single-turn (`done: true`) responses, so
/// one queue entry corresponds to exactly one worker-gate dispatch.
#[must_use]
pub fn clean_turn(narration: &str) -> WorkerTurn {
    WorkerTurn { narration: narration.to_string(), proposed_writes: Vec::new(), proposed_commands: Vec::new(), tokens_in: 100, tokens_out: 50, done: true }
}

/// A scripted turn proposing a destructive shell command, for safety-block scenarios.
#[must_use]
pub fn destructive_turn(command: &str) -> WorkerTurn {
    WorkerTurn { narration: "running cleanup".to_string(), proposed_writes: Vec::new(), proposed_commands: vec![command.to_string()], tokens_in: 10, tokens_out: 10, done: true }
}

/// A [`Worker`] double that replays a fixed queue of turns in invocation
/// order, one entry per dispatch loop iteration, falling back to an empty
/// `done: true` turn once the queue is exhausted — mirroring the scripted
/// worker `wave-dispatch`'s own dispatcher tests use.
pub struct ScriptedWorker {
    turns: Mutex<VecDeque<WorkerTurn>>,
}

impl ScriptedWorker {
    /// Builds a worker that replays `turns` in order.
    #[must_use]
    pub fn new(turns: Vec<WorkerTurn>) -> Self {
        Self { turns: Mutex::new(turns.into()) }
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn invoke(&self, _story: &Story, _role: &str, _context: &Value) -> Result<WorkerTurn, WorkerError> {
        let next = self.turns.lock().unwrap_or_else(std::sync::PoisonError::into_inner).pop_front();
        Ok(next.unwrap_or_else(|| clean_turn("")))
    }

    async fn kill(&self) -> WorkerExit {
        WorkerExit::Killed
    }
}

/// Polls `get_session` until `predicate` holds or `timeout` elapses.
///
/// The orchestrator drives each session on its own OS thread, so observing
/// a gate transition from a test is inherently a poll, not a direct call.
///
/// # Panics
/// Panics if `timeout` elapses without `predicate` returning `true`, or if
/// the session disappears from the orchestrator entirely.
pub async fn wait_for(
    orchestrator: &Arc<SessionOrchestrator>,
    session_id: &SessionId,
    timeout: Duration,
    mut predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match orchestrator.get_session(session_id) {
            Ok(snapshot) => {
                if predicate(&snapshot) {
                    return snapshot;
                }
            }
            Err(OrchestratorError::UnknownSession(_)) => {}
            Err(err) => panic!("unexpected orchestrator error while polling: {err}"),
        }
        assert!(tokio::time::Instant::now() < deadline, "condition not reached before timeout");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
