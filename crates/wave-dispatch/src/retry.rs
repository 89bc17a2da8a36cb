// crates/wave-dispatch/src/retry.rs
// ============================================================================
// Module: Retry Controller
// Description: The validate/fix loop: re-dispatches a distinct fix role with
//              the rejection payload as additional context, bounded by a
//              per-story attempt ceiling, escalating to a human on exhaustion
//              (C9).
// Purpose: Implement §4.9 exactly: idempotent retries from the prior
//          workspace's tip (never from main), a retry counter that is part
//          of the session checkpoint, and exactly one `escalation` signal
//          when the ceiling is reached.
// Dependencies: crate::agent::AgentDispatcher, wave-core
// ============================================================================

use serde_json::Value;
use serde_json::json;
use tracing::warn;

use wave_core::Bus;
use wave_core::Gate;
use wave_core::Sequence;
use wave_core::SessionId;
use wave_core::Signal;
use wave_core::SignalId;
use wave_core::SignalKind;
use wave_core::Story;
use wave_governor::BudgetAccountant;
use wave_governor::ContextGovernor;

use crate::agent::AgentDispatcher;
use crate::agent::DispatchError;
use crate::agent::DispatchOutcome;
use crate::emergency::EmergencyStop;

/// The system-wide default attempt ceiling (§9 resolved Open Question: a
/// story-level threshold defaulting to 3).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// The outcome of one [`RetryController::retry`] call.
#[derive(Debug, Clone)]
pub enum RetryOutcome {
    /// The fix dispatch ran and produced the given underlying outcome.
    Dispatched(DispatchOutcome),
    /// The attempt counter was already at the ceiling; no dispatch was
    /// issued and the story was escalated instead (§8: "a retry whose
    /// counter is already at the maximum immediately escalates without
    /// dispatching").
    Escalated,
}

/// Re-dispatches a fix role on QA rejection, bounded by a per-story attempt
/// ceiling, and escalates to a human once that ceiling is reached.
pub struct RetryController<'a> {
    dispatcher: &'a AgentDispatcher,
    max_attempts: u32,
}

impl<'a> RetryController<'a> {
    /// Builds a controller wrapping `dispatcher`, bounded by `max_attempts`
    /// (the story's own threshold, or [`DEFAULT_MAX_ATTEMPTS`] if unset).
    #[must_use]
    pub fn new(dispatcher: &'a AgentDispatcher, max_attempts: u32) -> Self {
        Self { dispatcher, max_attempts }
    }

    /// Re-dispatches `fix_role` against `story` carrying `rejection_payload`
    /// as additional context, provided `attempts_so_far` has not yet reached
    /// the ceiling; otherwise escalates without dispatching.
    ///
    /// `prior_workspace_branch` is the tip the new workspace is materialized
    /// from (never `main`), preserving whatever progress the rejected
    /// dispatch already made (§4.9 idempotence).
    ///
    /// # Errors
    /// Returns [`DispatchError`] for the same infrastructure failures
    /// [`AgentDispatcher::dispatch`] can return.
    #[allow(clippy::too_many_arguments, reason = "every argument is a distinct collaborator the retry contract requires")]
    pub async fn retry(
        &self,
        session_id: &SessionId,
        story: &Story,
        fix_role: &str,
        gate: Gate,
        prior_workspace_branch: &str,
        rejection_payload: &Value,
        attempts_so_far: u32,
        governor: &mut ContextGovernor,
        accountant: &mut BudgetAccountant,
        model: &str,
        stop: &EmergencyStop,
        bus: &dyn Bus,
        clock: &dyn wave_core::Clock,
        next_sequence: &mut dyn FnMut() -> Sequence,
    ) -> Result<RetryOutcome, DispatchError> {
        if attempts_so_far >= self.max_attempts {
            warn!(story = story.id.as_str(), attempts_so_far, max_attempts = self.max_attempts, "retry ceiling reached; escalating");
            let signal = Signal::new(
                SignalId::new(format!("{session_id}-{}", next_sequence())),
                session_id.clone(),
                Some(story.id.clone()),
                SignalKind::Escalation,
                "wave-dispatch",
                clock.now(),
                json!({"gate": gate.name(), "attempts": attempts_so_far}),
                next_sequence(),
            );
            bus.publish(signal).await?;
            return Ok(RetryOutcome::Escalated);
        }

        let retry_signal = Signal::new(
            SignalId::new(format!("{session_id}-{}", next_sequence())),
            session_id.clone(),
            Some(story.id.clone()),
            SignalKind::RetryRequested,
            "wave-dispatch",
            clock.now(),
            json!({"gate": gate.name(), "attempt": attempts_so_far + 1, "rejection": rejection_payload}),
            next_sequence(),
        );
        bus.publish(retry_signal).await?;

        let context = merge_rejection_context(rejection_payload);
        let outcome = self
            .dispatcher
            .dispatch(
                session_id,
                story,
                fix_role,
                gate,
                prior_workspace_branch,
                &context,
                governor,
                accountant,
                model,
                stop,
                next_sequence,
            )
            .await?;

        if matches!(outcome, DispatchOutcome::Completed { .. }) {
            let signal = Signal::new(
                SignalId::new(format!("{session_id}-{}", next_sequence())),
                session_id.clone(),
                Some(story.id.clone()),
                SignalKind::FixCompleted,
                "wave-dispatch",
                clock.now(),
                json!({"gate": gate.name(), "attempt": attempts_so_far + 1}),
                next_sequence(),
            );
            bus.publish(signal).await?;
        }

        Ok(RetryOutcome::Dispatched(outcome))
    }
}

/// Folds the rejection payload into the context a fix dispatch sees, under a
/// `rejection` key, leaving any `read_first` manifest untouched.
fn merge_rejection_context(rejection_payload: &Value) -> Value {
    json!({"rejection": rejection_payload})
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use wave_core::Domain;
    use wave_core::FilePolicy;
    use wave_core::FixedClock;
    use wave_core::Objective;
    use wave_core::ProjectId;
    use wave_core::Role;
    use wave_core::StoryId;
    use wave_core::StoryThresholds;
    use wave_core::Worker;
    use wave_core::WorkerError;
    use wave_core::WorkerExit;
    use wave_core::WorkerTurn;
    use wave_store::InMemoryBus;

    use super::*;
    use crate::vcs::InMemoryVcs;

    struct AlwaysDoneWorker;

    #[async_trait]
    impl Worker for AlwaysDoneWorker {
        async fn invoke(&self, _story: &Story, _role: &str, _context: &Value) -> Result<WorkerTurn, WorkerError> {
            Ok(WorkerTurn { narration: "fixed".to_string(), proposed_writes: vec![], proposed_commands: vec![], tokens_in: 1, tokens_out: 1, done: true })
        }

        async fn kill(&self) -> WorkerExit {
            WorkerExit::Killed
        }
    }

    fn story() -> Story {
        Story {
            id: StoryId::new("AUTH-1"),
            project: ProjectId::new("demo"),
            title: "login".to_string(),
            domain: Domain::new("AUTH"),
            role: Role::new("backend-1"),
            wave: 1,
            objective: Objective { as_a: "user".to_string(), i_want: "log in".to_string(), so_that: "access the app".to_string() },
            acceptance_criteria: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            files: FilePolicy { create: vec!["src/auth/".to_string()], modify: vec![], forbidden: vec![] },
            stop_conditions: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            thresholds: StoryThresholds { max_tokens: 1_000_000, max_cost_micros: 1_000_000, max_duration_minutes: 5 },
        }
    }

    fn rates() -> std::collections::HashMap<String, wave_core::ModelRate> {
        let mut rates = std::collections::HashMap::new();
        rates.insert("gpt-x".to_string(), wave_core::ModelRate { input_micros_per_1k: 1, output_micros_per_1k: 1 });
        rates
    }

    #[tokio::test]
    async fn ceiling_reached_escalates_without_dispatch() {
        let vcs = Arc::new(InMemoryVcs::new(0));
        let worker = Arc::new(AlwaysDoneWorker);
        let bus = InMemoryBus::new();
        let clock = FixedClock::new(0);
        let dispatcher = AgentDispatcher::new(worker, vcs, Arc::new(InMemoryBus::new()), Arc::new(FixedClock::new(0)));
        let controller = RetryController::new(&dispatcher, DEFAULT_MAX_ATTEMPTS);
        let mut governor = ContextGovernor::new(1_000);
        let mut accountant = BudgetAccountant::new(1_000_000, rates());
        accountant.register_story("AUTH-1", 1_000_000);
        let stop = EmergencyStop::never();
        let mut seq = Sequence::NONE;
        let mut next = || {
            seq = seq.next();
            seq
        };

        let outcome = controller
            .retry(
                &SessionId::new("s1"),
                &story(),
                "backend-fix-1",
                Gate::QaPassed,
                "main",
                &json!({"reason": "missing test"}),
                DEFAULT_MAX_ATTEMPTS,
                &mut governor,
                &mut accountant,
                "gpt-x",
                &stop,
                &bus,
                &clock,
                &mut next,
            )
            .await
            .expect("retry call succeeds");

        assert!(matches!(outcome, RetryOutcome::Escalated));
    }

    #[tokio::test]
    async fn attempt_below_ceiling_dispatches_and_emits_fix_completed() {
        let vcs = Arc::new(InMemoryVcs::new(0));
        let worker = Arc::new(AlwaysDoneWorker);
        let bus = InMemoryBus::new();
        let clock = FixedClock::new(0);
        let dispatcher = AgentDispatcher::new(worker, vcs, Arc::new(InMemoryBus::new()), Arc::new(FixedClock::new(0)));
        let controller = RetryController::new(&dispatcher, DEFAULT_MAX_ATTEMPTS);
        let mut governor = ContextGovernor::new(1_000);
        let mut accountant = BudgetAccountant::new(1_000_000, rates());
        accountant.register_story("AUTH-1", 1_000_000);
        let stop = EmergencyStop::never();
        let mut seq = Sequence::NONE;
        let mut next = || {
            seq = seq.next();
            seq
        };

        let outcome = controller
            .retry(
                &SessionId::new("s1"),
                &story(),
                "backend-fix-1",
                Gate::QaPassed,
                "main",
                &json!({"reason": "missing test"}),
                0,
                &mut governor,
                &mut accountant,
                "gpt-x",
                &stop,
                &bus,
                &clock,
                &mut next,
            )
            .await
            .expect("retry call succeeds");

        assert!(matches!(outcome, RetryOutcome::Dispatched(DispatchOutcome::Completed { .. })));
        let signals = bus.subscribe(&SessionId::new("s1"), Sequence::NONE).await.expect("subscribe");
        assert!(signals.iter().any(|signal| signal.kind == SignalKind::RetryRequested));
        assert!(signals.iter().any(|signal| signal.kind == SignalKind::FixCompleted));
    }
}
