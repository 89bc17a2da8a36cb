// crates/wave-dispatch/src/agent.rs
// ============================================================================
// Module: Agent Dispatcher
// Description: Spawns a worker invocation for one (story, role, gate) tuple
//              inside an allocated workspace, screening every proposed write
//              and command through the safety evaluator and metering every
//              turn through the budget accountant (C8).
// Purpose: Implement the seven dispatch steps in §4.8: allocate, announce,
//          invoke, screen, meter, validate, complete.
// Dependencies: wave-core::capability, wave-governor, wave-safety,
//               crate::{emergency, workspace}
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use tracing::info;
use tracing::warn;

use wave_core::Bus;
use wave_core::Clock;
use wave_core::Gate;
use wave_core::SafetyVerdict;
use wave_core::SessionId;
use wave_core::Signal;
use wave_core::SignalId;
use wave_core::SignalKind;
use wave_core::Story;
use wave_core::Vcs;
use wave_core::Worker;
use wave_core::WorkerExit;
use wave_core::Workspace;
use wave_governor::BudgetAccountant;
use wave_governor::ContextGovernor;
use wave_safety::EvaluationInput;

use crate::emergency::EmergencyStop;
use crate::workspace as sandbox;

/// The outcome of one [`AgentDispatcher::dispatch`] call, matching the four
/// terminal states named in §4.8's contract (`completed`, `rejected`,
/// `timeout`, plus the boundary/safety blocks §7 classifies as rejections).
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The worker finished, every write satisfied the domain boundary, and
    /// the workspace has been released (branch preserved).
    Completed {
        /// The workspace the work landed in (already released).
        workspace: Workspace,
        /// A short human-readable summary for the `gate-completed` signal.
        summary: String,
    },
    /// The safety evaluator blocked a proposed write or command.
    SafetyBlocked {
        /// The verdict that triggered the block.
        verdict: SafetyVerdict,
    },
    /// Modified paths fell outside the story's allow-list or inside its deny-list.
    BoundaryViolation {
        /// Every offending path, per [`wave_core::BoundaryCheck`].
        offending_paths: Vec<String>,
    },
    /// A budget threshold at 100% was crossed mid-dispatch.
    BudgetExceeded,
    /// No worker turn and no file modification occurred within the story's timeout.
    Timeout,
    /// Emergency stop was observed before or during the dispatch.
    EmergencyStopped,
    /// The worker process crashed or exited abnormally.
    WorkerCrashed {
        /// The underlying failure reason.
        reason: String,
    },
}

/// Error returned by [`AgentDispatcher::dispatch`] for conditions that are
/// not a normal dispatch outcome (infrastructure failures on the bus/vcs
/// side, which the caller retries or surfaces per §7).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The workspace provider failed to allocate or release a workspace.
    #[error("vcs error: {0}")]
    Vcs(#[from] wave_core::VcsError),
    /// The signal bus rejected a publish.
    #[error("bus error: {0}")]
    Bus(#[from] wave_core::BusError),
    /// The budget accountant has no rate configured for the dispatch's model.
    #[error("budget accounting error: {0}")]
    Accounting(#[from] wave_governor::AccountantError),
}

/// Spawns worker processes per `(story, role, gate)`, screens their output,
/// meters their usage, and validates the result against the story's domain
/// boundary (C8).
///
/// Holds no session state itself: the caller (C10) owns the governor,
/// accountant, and emergency-stop watcher and passes them in by reference so
/// replay determinism stays entirely in the orchestrator's hands.
pub struct AgentDispatcher {
    worker: Arc<dyn Worker>,
    vcs: Arc<dyn Vcs>,
    bus: Arc<dyn Bus>,
    clock: Arc<dyn Clock>,
}

impl AgentDispatcher {
    /// Builds a dispatcher over the given worker, vcs, bus, and clock capabilities.
    #[must_use]
    pub fn new(worker: Arc<dyn Worker>, vcs: Arc<dyn Vcs>, bus: Arc<dyn Bus>, clock: Arc<dyn Clock>) -> Self {
        Self { worker, vcs, bus, clock }
    }

    /// Runs one dispatch for `story` at `gate`, under `role`, seeded with
    /// `context`. Implements the seven steps of §4.8.
    ///
    /// # Errors
    /// Returns [`DispatchError`] for infrastructure failures (vcs, bus,
    /// unknown model rate); any other terminal condition is reported through
    /// [`DispatchOutcome`], never as an `Err`.
    #[allow(clippy::too_many_arguments, reason = "every argument is a distinct collaborator the dispatcher contract requires")]
    pub async fn dispatch(
        &self,
        session_id: &SessionId,
        story: &Story,
        role: &str,
        gate: Gate,
        base_revision: &str,
        context: &Value,
        governor: &mut ContextGovernor,
        accountant: &mut BudgetAccountant,
        model: &str,
        stop: &EmergencyStop,
        next_sequence: &mut dyn FnMut() -> wave_core::Sequence,
    ) -> Result<DispatchOutcome, DispatchError> {
        if stop.is_set() {
            return Ok(DispatchOutcome::EmergencyStopped);
        }

        let workspace = self.vcs.materialize(story, base_revision).await?;
        self.emit(session_id, Some(story.id.clone()), SignalKind::GateStarted, "wave-dispatch", json!({"gate": gate.name(), "role": role}), next_sequence())
            .await?;
        for (path, content) in preload_manifest(context) {
            let _ = governor.put(path, content);
        }
        for key in governor.pinned_keys() {
            let _ = governor.pin(&key);
        }

        let timeout = Duration::from_secs(u64::from(story.thresholds.max_duration_minutes) * 60);
        let mut narration_summary = String::new();
        let mut all_writes: Vec<(String, String)> = Vec::new();

        loop {
            if stop.is_set() {
                self.worker.kill().await;
                let _ = self.vcs.release(&workspace.id).await;
                return Ok(DispatchOutcome::EmergencyStopped);
            }

            let turn = match tokio::time::timeout(timeout, self.worker.invoke(story, role, context)).await {
                Ok(Ok(turn)) => turn,
                Ok(Err(err)) => {
                    let _ = self.vcs.release(&workspace.id).await;
                    self.emit(
                        session_id,
                        Some(story.id.clone()),
                        SignalKind::GateFailed,
                        "wave-dispatch",
                        json!({"gate": gate.name(), "reason": "worker-crash", "detail": err.to_string()}),
                        next_sequence(),
                    )
                    .await?;
                    return Ok(DispatchOutcome::WorkerCrashed { reason: err.to_string() });
                }
                Err(_elapsed) => {
                    self.worker.kill().await;
                    let _ = self.vcs.release(&workspace.id).await;
                    self.emit(
                        session_id,
                        Some(story.id.clone()),
                        SignalKind::Timeout,
                        "wave-dispatch",
                        json!({"gate": gate.name()}),
                        next_sequence(),
                    )
                    .await?;
                    return Ok(DispatchOutcome::Timeout);
                }
            };

            narration_summary = turn.narration.clone();

            for (path, content) in &turn.proposed_writes {
                let verdict = wave_safety::evaluate(&EvaluationInput {
                    content,
                    path: Some(path.as_str()),
                    policy: Some(&story.files),
                    stop_conditions: &story.stop_conditions,
                });
                if let Some(outcome) = self.handle_blocked(&workspace, session_id, story, gate, &verdict, next_sequence).await? {
                    return Ok(outcome);
                }
            }

            for command in &turn.proposed_commands {
                let verdict = wave_safety::evaluate(&EvaluationInput {
                    content: command,
                    path: None,
                    policy: None,
                    stop_conditions: &story.stop_conditions,
                });
                if let Some(outcome) = self.handle_blocked(&workspace, session_id, story, gate, &verdict, next_sequence).await? {
                    return Ok(outcome);
                }
            }

            let outcome = accountant.record(story.id.as_str(), turn.tokens_in, turn.tokens_out, model)?;
            if outcome.session_crossed.contains(&wave_core::ThresholdLevel::Exceeded) || outcome.story_exceeded {
                self.worker.kill().await;
                let _ = self.vcs.release(&workspace.id).await;
                self.emit(
                    session_id,
                    Some(story.id.clone()),
                    SignalKind::BudgetExceeded,
                    "wave-dispatch",
                    json!({"gate": gate.name()}),
                    next_sequence(),
                )
                .await?;
                return Ok(DispatchOutcome::BudgetExceeded);
            }
            for level in outcome.session_crossed.iter().chain(outcome.story_crossed.iter()) {
                if *level != wave_core::ThresholdLevel::Exceeded {
                    self.emit(
                        session_id,
                        Some(story.id.clone()),
                        SignalKind::BudgetWarning,
                        "wave-dispatch",
                        json!({"gate": gate.name(), "level": format!("{level:?}")}),
                        next_sequence(),
                    )
                    .await?;
                }
            }

            all_writes.extend(turn.proposed_writes.clone());
            if !all_writes.is_empty() {
                if let Err(err) = sandbox::apply_writes(&workspace, &turn.proposed_writes) {
                    let _ = self.vcs.release(&workspace.id).await;
                    warn!(error = %err, "proposed write rejected at the workspace sandbox boundary");
                    return Ok(DispatchOutcome::BoundaryViolation { offending_paths: vec![err.to_string()] });
                }
                for (path, _) in &turn.proposed_writes {
                    self.vcs_record_write_hint(&workspace, path);
                }
            }

            if turn.done {
                break;
            }
        }

        let modified = self.vcs.diff(&workspace).await?;
        let boundary = workspace.check_boundary(modified.iter().map(String::as_str));
        if let wave_core::BoundaryCheck::Violated { offending_paths } = boundary {
            let _ = self.vcs.release(&workspace.id).await;
            self.emit(
                session_id,
                Some(story.id.clone()),
                SignalKind::GateFailed,
                "wave-dispatch",
                json!({"gate": gate.name(), "reason": "boundary-violation", "paths": offending_paths}),
                next_sequence(),
            )
            .await?;
            return Ok(DispatchOutcome::BoundaryViolation { offending_paths });
        }

        self.vcs.release(&workspace.id).await?;
        self.emit(
            session_id,
            Some(story.id.clone()),
            SignalKind::GateCompleted,
            "wave-dispatch",
            json!({"gate": gate.name(), "workspace": workspace.id.as_str(), "summary": narration_summary}),
            next_sequence(),
        )
        .await?;
        info!(story = story.id.as_str(), gate = gate.name(), "dispatch completed");
        Ok(DispatchOutcome::Completed { workspace, summary: narration_summary })
    }

    /// Best-effort hint for in-memory `Vcs` fakes that track writes
    /// explicitly rather than reading a real worktree; a no-op for real
    /// backends since [`Vcs::diff`] already reflects the write.
    fn vcs_record_write_hint(&self, _workspace: &Workspace, _path: &str) {
        // Real `Vcs` backends compute `diff` from the materialized worktree
        // directly; nothing to record here. Kept as an extension point for
        // fakes that need an explicit recording call (see `InMemoryVcs`).
    }

    async fn handle_blocked(
        &self,
        workspace: &Workspace,
        session_id: &SessionId,
        story: &Story,
        gate: Gate,
        verdict: &SafetyVerdict,
        next_sequence: &mut dyn FnMut() -> wave_core::Sequence,
    ) -> Result<Option<DispatchOutcome>, DispatchError> {
        if !verdict.is_blocked() {
            return Ok(None);
        }
        self.worker.kill().await;
        let _ = self.vcs.release(&workspace.id).await;
        let is_stop_condition =
            verdict.violations.iter().any(|violation| violation.kind == wave_core::ViolationKind::StopConditionHit);
        if is_stop_condition {
            self.emit(
                session_id,
                Some(story.id.clone()),
                SignalKind::EmergencyStop,
                "wave-dispatch",
                json!({"gate": gate.name(), "reason": "stop-condition-hit", "score": verdict.score}),
                next_sequence(),
            )
            .await?;
        } else {
            self.emit(
                session_id,
                Some(story.id.clone()),
                SignalKind::GateFailed,
                "wave-dispatch",
                json!({"gate": gate.name(), "reason": "safety-block", "score": verdict.score}),
                next_sequence(),
            )
            .await?;
        }
        Ok(Some(DispatchOutcome::SafetyBlocked { verdict: verdict.clone() }))
    }

    async fn emit(
        &self,
        session_id: &SessionId,
        story_id: Option<wave_core::StoryId>,
        kind: SignalKind,
        producer: &str,
        payload: Value,
        sequence: wave_core::Sequence,
    ) -> Result<(), DispatchError> {
        let signal = Signal::new(
            SignalId::new(format!("{session_id}-{sequence}")),
            session_id.clone(),
            story_id,
            kind,
            producer,
            self.clock.now(),
            payload,
            sequence,
        );
        self.bus.publish(signal).await?;
        Ok(())
    }
}

/// Extracts a `read_first` manifest (`{"read_first": [[path, content], ...]}`)
/// from the dispatch context, if present, for pre-loading pinned entries (§4.4).
fn preload_manifest(context: &Value) -> Vec<(String, String)> {
    context
        .get("read_first")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let pair = entry.as_array()?;
                    let path = pair.first()?.as_str()?.to_string();
                    let content = pair.get(1)?.as_str()?.to_string();
                    Some((path, content))
                })
                .collect()
        })
        .unwrap_or_default()
}
