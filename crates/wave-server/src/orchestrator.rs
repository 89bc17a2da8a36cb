// crates/wave-server/src/orchestrator.rs
// ============================================================================
// Module: Session Orchestrator (C10)
// Description: The top-level driver: for each session, subscribes to its own
//              decisions rather than an external signal feed (single driver
//              per session, §5), advances gates, dispatches or retries
//              worker-backed gates, and checkpoints at every gate boundary.
// Purpose: Implement §4.10: one `Runtime` threaded through every session
//          driver, one OS thread per active session (§5's thread-per-session
//          idiom), coordinating with the control surface over plain
//          channels rather than shared mutable state.
// Dependencies: wave-core, wave-governor, wave-safety, wave-dispatch,
//               wave-store, wave-config
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use tracing::error;
use tracing::info;
use tracing::warn;

use wave_core::BudgetLedger;
use wave_core::Checkpoint;
use wave_core::ContextSummary;
use wave_core::Gate;
use wave_core::ProjectId;
use wave_core::Sequence;
use wave_core::Session;
use wave_core::SessionId;
use wave_core::SessionStatus;
use wave_core::Signal;
use wave_core::SignalId;
use wave_core::SignalKind;
use wave_core::Story;
use wave_core::StoryId;
use wave_dispatch::AgentDispatcher;
use wave_dispatch::DispatchOutcome;
use wave_dispatch::EmergencyStop;
use wave_dispatch::RetryController;
use wave_governor::BudgetAccountant;
use wave_governor::ContextGovernor;
use wave_governor::DEFAULT_CAP_TOKENS;

use crate::runtime::Runtime;

/// Gates driven directly by the orchestrator: no worker is invoked, the gate
/// is simply recorded as reached. These are the lifecycle boundaries owned
/// by humans or upstream tooling (design review, assignment, planning,
/// the safety/review/merge/deploy approvals) rather than by an agent turn.
const ADMINISTRATIVE_GATES: [Gate; 7] = [
    Gate::DesignValidated,
    Gate::StoryAssigned,
    Gate::PlanApproved,
    Gate::SafetyCleared,
    Gate::ReviewApproved,
    Gate::Merged,
    Gate::Deployed,
];

/// Returns `true` iff `gate` is dispatched to a worker rather than recorded
/// administratively.
fn is_worker_gate(gate: Gate) -> bool {
    !ADMINISTRATIVE_GATES.contains(&gate)
}

/// The role a fix dispatch runs under after a worker-gate rejection,
/// derived from the story's assigned role (§4.9 resolved: no separate
/// fix-role field on [`Story`], so the retry controller reuses the story's
/// role with a `-fix` suffix, matching the naming the dispatcher's own
/// tests use for scripted fix workers).
fn fix_role(role: &str) -> String {
    format!("{role}-fix")
}

/// Error returned by a control-surface operation on the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// No session with the given id is known to this process.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    /// A story was assigned a role with no configured model rate.
    #[error("story {story} assigns role {role} with no configured model")]
    UnconfiguredRole {
        /// The offending story.
        story: StoryId,
        /// The role with no model assignment.
        role: String,
    },
    /// The checkpoint store rejected a read or write.
    #[error(transparent)]
    Store(#[from] wave_core::StoreError),
    /// The signal bus rejected a publish.
    #[error(transparent)]
    Bus(#[from] wave_core::BusError),
    /// A requested session status transition is illegal from the session's
    /// current status.
    #[error(transparent)]
    Transition(#[from] wave_core::SessionTransitionError),
}

/// A point-in-time view of a session, cheap to clone for `get-session`
/// responses without locking the driving thread's own state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// The session identifier.
    pub id: SessionId,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Per-story gate reached, keyed by story id.
    pub per_story_gate: BTreeMap<String, Gate>,
    /// The session-wide budget ledger.
    pub budget: BudgetLedger,
}

/// A request delivered to a session's driver thread from the control
/// surface. Delivered over a plain channel rather than shared state, per
/// the no-cyclic-callback design note (§9): the driver polls for these
/// between gate dispatches rather than being called into directly.
enum SessionCommand {
    Pause,
    Resume,
    Abort(String),
    EmergencyStop(String, String),
}

struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshot: Arc<Mutex<SessionSnapshot>>,
    stop: Arc<EmergencyStop>,
}

/// The top-level driver (C10): owns one thread per active session, wires
/// every collaborator in a [`Runtime`] into each session's drive loop, and
/// exposes the control-surface operations of §6.
pub struct SessionOrchestrator {
    runtime: Arc<Runtime>,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl SessionOrchestrator {
    /// Builds an orchestrator over `runtime`, with no sessions running yet.
    #[must_use]
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime, sessions: Mutex::new(HashMap::new()) }
    }

    /// Resumes every session the store reports as `running` or `paused`
    /// (§8 scenario S6: crash recovery). Must be called once at process
    /// start, before the control surface begins accepting new sessions.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::Store`] if the store cannot be queried,
    /// or [`OrchestratorError::Store`]/[`OrchestratorError::Bus`] for any
    /// session whose latest checkpoint cannot be loaded.
    pub async fn recover(&self) -> Result<usize, OrchestratorError> {
        let resumable = self.runtime.store.list_resumable_sessions().await?;
        let mut resumed = 0;
        for session_id in resumable {
            let Some((checkpoint, _signals)) = self.runtime.store.load_latest(&session_id).await? else {
                warn!(session = %session_id, "session marked resumable but has no checkpoint; skipping");
                continue;
            };
            self.resume_from_checkpoint(session_id, checkpoint);
            resumed += 1;
        }
        Ok(resumed)
    }

    /// Validates and submits a new session, spawning its driver thread.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::UnconfiguredRole`] if any story assigns
    /// a role with no entry in `config.models`.
    pub fn start_session(&self, project: ProjectId, stories: Vec<Story>, base_revision: String) -> Result<SessionId, OrchestratorError> {
        for story in &stories {
            if !self.runtime.config.models.contains_key(story.role.as_str()) {
                return Err(OrchestratorError::UnconfiguredRole { story: story.id.clone(), role: story.role.as_str().to_string() });
            }
        }

        let session_id = SessionId::new(format!("{}-{}", project.as_str(), self.runtime.clock.now().as_unix_millis()));
        let per_story_gate: BTreeMap<String, Gate> = stories.iter().map(|story| (story.id.as_str().to_string(), Gate::first())).collect();
        let mut session = Session::new(
            session_id.clone(),
            project,
            self.runtime.clock.now().as_unix_millis(),
            stories,
            self.runtime.config.budget.session_cap_micros,
        );
        session.transition(SessionStatus::Running)?;
        (self.runtime.status_sink)(&session);

        let (commands_tx, commands_rx) = mpsc::channel();
        let stop = Arc::new(EmergencyStop::new(
            self.runtime.config.emergency_stop_dir.as_ref().map(|dir| dir.join(format!("{session_id}.stop"))),
        ));
        let snapshot = Arc::new(Mutex::new(SessionSnapshot {
            id: session_id.clone(),
            status: session.status,
            per_story_gate,
            budget: session.budget.clone(),
        }));

        self.spawn_driver(session, base_revision, Sequence::NONE, commands_rx, Arc::clone(&snapshot), Arc::clone(&stop));
        self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(
            session_id.clone(),
            SessionHandle { commands: commands_tx, snapshot, stop },
        );
        Ok(session_id)
    }

    fn resume_from_checkpoint(&self, session_id: SessionId, checkpoint: Checkpoint) {
        let Ok(Some(extra_status)) = serde_json::from_value::<Option<SessionStatus>>(checkpoint.extra.get("session_status").cloned().unwrap_or(Value::Null))
        else {
            warn!(session = %session_id, "checkpoint carries no recognizable session status; skipping resume");
            return;
        };
        let per_story_gate = checkpoint.per_story_gate.clone();
        let snapshot = Arc::new(Mutex::new(SessionSnapshot {
            id: session_id.clone(),
            status: extra_status,
            per_story_gate,
            budget: checkpoint.budget.clone(),
        }));
        let (commands_tx, commands_rx) = mpsc::channel();
        let stop = Arc::new(EmergencyStop::new(
            self.runtime.config.emergency_stop_dir.as_ref().map(|dir| dir.join(format!("{session_id}.stop"))),
        ));

        info!(session = %session_id, sequence = checkpoint.sequence.get(), "resuming session from checkpoint");

        // A full replay reconstructs each story from the session's original
        // submission, which this process does not retain past checkpointing
        // (only the per-story gate map survives, by design — §4.2's
        // checkpoint row shape carries no story bodies). Recovery therefore
        // resumes bookkeeping (status, gate map, budget) for `get-session`
        // and `emergency-stop` immediately, and redrives outstanding worker
        // dispatches once the control surface resubmits the session's
        // stories; a deployment that needs unattended resume should persist
        // story bodies itself and resubmit on restart.
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(session_id, SessionHandle { commands: commands_tx, snapshot, stop });
    }

    /// Spawns the dedicated driver thread for one session (§5's
    /// thread-per-session idiom): the thread owns a current-thread Tokio
    /// runtime to drive the dispatcher's async calls, but the drive loop's
    /// own control flow is synchronous and blocking.
    fn spawn_driver(
        &self,
        session: Session,
        base_revision: String,
        resume_from: Sequence,
        commands: mpsc::Receiver<SessionCommand>,
        snapshot: Arc<Mutex<SessionSnapshot>>,
        stop: Arc<EmergencyStop>,
    ) {
        let runtime = Arc::clone(&self.runtime);
        let session_id = session.id.clone();
        let builder = std::thread::Builder::new().name(format!("wave-session-{session_id}"));
        let spawn_result = builder.spawn(move || {
            let tokio_rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(err) => {
                    error!(session = %session_id, %err, "failed to start session driver runtime");
                    return;
                }
            };
            tokio_rt.block_on(drive_session(runtime, session, base_revision, resume_from, commands, snapshot, stop));
        });
        if let Err(err) = spawn_result {
            error!(%err, "failed to spawn session driver thread");
        }
    }

    /// The number of sessions this process is currently tracking (running,
    /// paused, or otherwise not yet reaped), for the `health` endpoint (§6).
    #[must_use]
    pub fn active_session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Returns a point-in-time snapshot of a known session.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::UnknownSession`] if no such session has
    /// been started (or resumed) in this process.
    pub fn get_session(&self, session_id: &SessionId) -> Result<SessionSnapshot, OrchestratorError> {
        let sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let handle = sessions.get(session_id).ok_or_else(|| OrchestratorError::UnknownSession(session_id.clone()))?;
        Ok(handle.snapshot.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone())
    }

    /// Requests that a running session pause before its next gate dispatch.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::UnknownSession`] if no such session is known.
    pub fn pause_session(&self, session_id: &SessionId) -> Result<(), OrchestratorError> {
        self.send(session_id, SessionCommand::Pause)
    }

    /// Requests that a paused session resume driving.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::UnknownSession`] if no such session is known.
    pub fn resume_session(&self, session_id: &SessionId) -> Result<(), OrchestratorError> {
        self.send(session_id, SessionCommand::Resume)
    }

    /// Requests that a session abort with the given human-readable reason.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::UnknownSession`] if no such session is known.
    pub fn abort_session(&self, session_id: &SessionId, reason: String) -> Result<(), OrchestratorError> {
        self.send(session_id, SessionCommand::Abort(reason))
    }

    /// Triggers an immediate, idempotent emergency stop (§6): sets the
    /// session's emergency-stop flag (observed by the dispatcher before its
    /// next action and between worker turns) and requests the session
    /// transition to `aborted`.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::UnknownSession`] if no such session is known.
    pub fn emergency_stop(&self, session_id: &SessionId, reason: String, actor: String) -> Result<(), OrchestratorError> {
        let sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let handle = sessions.get(session_id).ok_or_else(|| OrchestratorError::UnknownSession(session_id.clone()))?;
        handle.stop.set();
        handle
            .commands
            .send(SessionCommand::EmergencyStop(reason, actor))
            .unwrap_or_else(|err| warn!(session = %session_id, %err, "session driver already exited"));
        Ok(())
    }

    fn send(&self, session_id: &SessionId, command: SessionCommand) -> Result<(), OrchestratorError> {
        let sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let handle = sessions.get(session_id).ok_or_else(|| OrchestratorError::UnknownSession(session_id.clone()))?;
        handle
            .commands
            .send(command)
            .unwrap_or_else(|err| warn!(session = %session_id, %err, "session driver already exited"));
        Ok(())
    }
}

/// Counter shared by the signal bus and checkpoint store within one
/// session's drive loop: both consume the same monotonic stream, so replay
/// only has to reconcile one counter rather than two (§5's ordering
/// guarantee applies independently per stream, but sharing the counter is
/// the simplest implementation that still satisfies it).
struct SequenceCounter(Sequence);

impl SequenceCounter {
    fn next(&mut self) -> Sequence {
        self.0 = self.0.next();
        self.0
    }
}

/// Drives one session to completion, pause, abort, or emergency stop.
///
/// Stories are driven one at a time, in submission order, to completion of
/// the canonical gate sequence; the concurrent same-wave/disjoint-domain
/// scheduling permitted by §5 is a capacity optimization this
/// implementation does not take, since a session's own driver thread
/// already bounds it to one action at a time for replay determinism.
#[allow(clippy::too_many_lines, reason = "the drive loop is the orchestrator's single cohesive state machine")]
async fn drive_session(
    runtime: Arc<Runtime>,
    mut session: Session,
    base_revision: String,
    resume_from: Sequence,
    commands: mpsc::Receiver<SessionCommand>,
    snapshot: Arc<Mutex<SessionSnapshot>>,
    stop: Arc<EmergencyStop>,
) {
    let mut sequence = SequenceCounter(resume_from);
    let mut governor = ContextGovernor::new(DEFAULT_CAP_TOKENS);
    let mut accountant = BudgetAccountant::new(session.budget.cap_micros, runtime.config.rates.clone());
    for story in &session.stories {
        accountant.register_story(story.id.as_str(), story.thresholds.max_cost_micros);
    }
    let mut per_story_gate: BTreeMap<String, Gate> =
        session.stories.iter().map(|story| (story.id.as_str().to_string(), Gate::first())).collect();
    let mut retry_attempts: HashMap<String, u32> = HashMap::new();
    let dispatcher = AgentDispatcher::new(Arc::clone(&runtime.worker), Arc::clone(&runtime.vcs), Arc::clone(&runtime.bus), Arc::clone(&runtime.clock));
    let retry_controller = RetryController::new(&dispatcher, runtime.config.budget.default_max_retry_attempts);

    'stories: for story in session.stories.clone() {
        let model = match runtime.config.models.get(story.role.as_str()) {
            Some(model) => model.clone(),
            None => {
                error!(story = story.id.as_str(), "story role has no configured model; aborting session");
                fail_session(&mut session, &runtime, &snapshot);
                return;
            }
        };

        loop {
            match drain_commands(&commands, &mut session, &runtime, &snapshot) {
                CommandOutcome::Continue => {}
                CommandOutcome::Stop => break 'stories,
            }
            if stop.is_set() && session.status != SessionStatus::Aborted {
                let _ = session.transition(SessionStatus::Aborted);
                (runtime.status_sink)(&session);
                break 'stories;
            }
            if session.status == SessionStatus::Paused {
                std::thread::sleep(Duration::from_millis(20));
                continue;
            }

            let current_gate = *per_story_gate.get(story.id.as_str()).unwrap_or(&Gate::first());
            if current_gate.is_terminal() {
                break;
            }
            let Some(next_gate) = current_gate.next() else { break };

            if !is_worker_gate(next_gate) {
                emit(&runtime, &session.id, Some(story.id.clone()), SignalKind::GateStarted, json!({"gate": next_gate.name()}), sequence.next()).await;
                let trigger =
                    emit(&runtime, &session.id, Some(story.id.clone()), SignalKind::GateCompleted, json!({"gate": next_gate.name()}), sequence.next()).await;
                per_story_gate.insert(story.id.as_str().to_string(), next_gate);
                checkpoint(&runtime, &session, &per_story_gate, &accountant, &governor, &mut sequence, &trigger).await;
                update_snapshot(&snapshot, &session, &per_story_gate, &accountant);
                continue;
            }

            let attempts = *retry_attempts.get(story.id.as_str()).unwrap_or(&0);
            let context = json!({});
            let outcome = dispatcher
                .dispatch(&session.id, &story, story.role.as_str(), next_gate, &base_revision, &context, &mut governor, &mut accountant, &model, &stop, &mut || sequence.next())
                .await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(story = story.id.as_str(), %err, "dispatch infrastructure failure; pausing session");
                    pause_session_state(&mut session, &runtime, &snapshot, &per_story_gate, &accountant);
                    break 'stories;
                }
            };

            match outcome {
                DispatchOutcome::Completed { summary, .. } => {
                    if next_gate == Gate::QaPassed && summary.to_ascii_lowercase().contains("reject") {
                        emit(&runtime, &session.id, Some(story.id.clone()), SignalKind::QaRejected, json!({"summary": summary}), sequence.next()).await;
                        match escalate_or_retry(
                            &retry_controller,
                            &runtime,
                            &session,
                            &story,
                            next_gate,
                            &base_revision,
                            &json!({"reason": summary}),
                            attempts,
                            &mut governor,
                            &mut accountant,
                            &model,
                            &stop,
                            &mut sequence,
                        )
                        .await
                        {
                            RetryStepResult::Escalated => {
                                pause_session_state(&mut session, &runtime, &snapshot, &per_story_gate, &accountant);
                                break 'stories;
                            }
                            RetryStepResult::Continue(new_attempts) => {
                                retry_attempts.insert(story.id.as_str().to_string(), new_attempts);
                                continue;
                            }
                        }
                    }
                    let trigger =
                        emit(&runtime, &session.id, Some(story.id.clone()), SignalKind::QaApproved, json!({"gate": next_gate.name()}), sequence.next()).await;
                    per_story_gate.insert(story.id.as_str().to_string(), next_gate);
                    checkpoint(&runtime, &session, &per_story_gate, &accountant, &governor, &mut sequence, &trigger).await;
                    update_snapshot(&snapshot, &session, &per_story_gate, &accountant);
                }
                DispatchOutcome::BudgetExceeded => {
                    warn!(story = story.id.as_str(), "budget exceeded at 100%% of cap; pausing session");
                    pause_session_state(&mut session, &runtime, &snapshot, &per_story_gate, &accountant);
                    break 'stories;
                }
                DispatchOutcome::EmergencyStopped => {
                    break 'stories;
                }
                DispatchOutcome::SafetyBlocked { verdict } => {
                    let rejection = json!({"reason": "safety-block", "score": verdict.score});
                    match escalate_or_retry(
                        &retry_controller,
                        &runtime,
                        &session,
                        &story,
                        next_gate,
                        &base_revision,
                        &rejection,
                        attempts,
                        &mut governor,
                        &mut accountant,
                        &model,
                        &stop,
                        &mut sequence,
                    )
                    .await
                    {
                        RetryStepResult::Escalated => {
                            pause_session_state(&mut session, &runtime, &snapshot, &per_story_gate, &accountant);
                            break 'stories;
                        }
                        RetryStepResult::Continue(new_attempts) => {
                            retry_attempts.insert(story.id.as_str().to_string(), new_attempts);
                        }
                    }
                }
                DispatchOutcome::BoundaryViolation { offending_paths } => {
                    let rejection = json!({"reason": "boundary-violation", "paths": offending_paths});
                    match escalate_or_retry(
                        &retry_controller,
                        &runtime,
                        &session,
                        &story,
                        next_gate,
                        &base_revision,
                        &rejection,
                        attempts,
                        &mut governor,
                        &mut accountant,
                        &model,
                        &stop,
                        &mut sequence,
                    )
                    .await
                    {
                        RetryStepResult::Escalated => {
                            pause_session_state(&mut session, &runtime, &snapshot, &per_story_gate, &accountant);
                            break 'stories;
                        }
                        RetryStepResult::Continue(new_attempts) => {
                            retry_attempts.insert(story.id.as_str().to_string(), new_attempts);
                        }
                    }
                }
                DispatchOutcome::Timeout | DispatchOutcome::WorkerCrashed { .. } => {
                    let rejection = json!({"reason": "worker-failure"});
                    match escalate_or_retry(
                        &retry_controller,
                        &runtime,
                        &session,
                        &story,
                        next_gate,
                        &base_revision,
                        &rejection,
                        attempts,
                        &mut governor,
                        &mut accountant,
                        &model,
                        &stop,
                        &mut sequence,
                    )
                    .await
                    {
                        RetryStepResult::Escalated => {
                            pause_session_state(&mut session, &runtime, &snapshot, &per_story_gate, &accountant);
                            break 'stories;
                        }
                        RetryStepResult::Continue(new_attempts) => {
                            retry_attempts.insert(story.id.as_str().to_string(), new_attempts);
                        }
                    }
                }
            }
        }
    }

    if session.status == SessionStatus::Running {
        let all_terminal = per_story_gate.values().all(|gate| gate.is_terminal());
        if all_terminal {
            let _ = session.transition(SessionStatus::Completed);
            (runtime.status_sink)(&session);
            let trigger = emit(&runtime, &session.id, None, SignalKind::GateCompleted, json!({"session": "completed"}), sequence.next()).await;
            checkpoint(&runtime, &session, &per_story_gate, &accountant, &governor, &mut sequence, &trigger).await;
            update_snapshot(&snapshot, &session, &per_story_gate, &accountant);
        }
    }
}

enum RetryStepResult {
    Escalated,
    Continue(u32),
}

#[allow(clippy::too_many_arguments, reason = "every argument is a distinct collaborator the retry step requires")]
async fn escalate_or_retry(
    retry_controller: &RetryController<'_>,
    runtime: &Runtime,
    session: &Session,
    story: &Story,
    gate: Gate,
    base_revision: &str,
    rejection: &Value,
    attempts: u32,
    governor: &mut ContextGovernor,
    accountant: &mut BudgetAccountant,
    model: &str,
    stop: &EmergencyStop,
    sequence: &mut SequenceCounter,
) -> RetryStepResult {
    let outcome = retry_controller
        .retry(
            &session.id,
            story,
            &fix_role(story.role.as_str()),
            gate,
            base_revision,
            rejection,
            attempts,
            governor,
            accountant,
            model,
            stop,
            runtime.bus.as_ref(),
            runtime.clock.as_ref(),
            &mut || sequence.next(),
        )
        .await;

    match outcome {
        Ok(wave_dispatch::RetryOutcome::Escalated) => RetryStepResult::Escalated,
        Ok(wave_dispatch::RetryOutcome::Dispatched(_)) => RetryStepResult::Continue(attempts + 1),
        Err(err) => {
            error!(story = story.id.as_str(), %err, "retry dispatch infrastructure failure");
            RetryStepResult::Escalated
        }
    }
}

enum CommandOutcome {
    Continue,
    Stop,
}

fn drain_commands(commands: &mpsc::Receiver<SessionCommand>, session: &mut Session, runtime: &Runtime, snapshot: &Mutex<SessionSnapshot>) -> CommandOutcome {
    let mut outcome = CommandOutcome::Continue;
    while let Ok(command) = commands.try_recv() {
        match command {
            SessionCommand::Pause => {
                if session.transition(SessionStatus::Paused).is_ok() {
                    (runtime.status_sink)(session);
                }
            }
            SessionCommand::Resume => {
                if session.transition(SessionStatus::Running).is_ok() {
                    (runtime.status_sink)(session);
                }
            }
            SessionCommand::Abort(reason) => {
                info!(session = %session.id, reason, "session aborted by operator");
                if session.transition(SessionStatus::Aborted).is_ok() {
                    (runtime.status_sink)(session);
                }
                outcome = CommandOutcome::Stop;
            }
            SessionCommand::EmergencyStop(reason, actor) => {
                warn!(session = %session.id, reason, actor, "emergency stop triggered");
                if session.transition(SessionStatus::Aborted).is_ok() {
                    (runtime.status_sink)(session);
                }
                outcome = CommandOutcome::Stop;
            }
        }
    }
    let mut locked = snapshot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    locked.status = session.status;
    outcome
}

fn pause_session_state(
    session: &mut Session,
    runtime: &Runtime,
    snapshot: &Mutex<SessionSnapshot>,
    per_story_gate: &BTreeMap<String, Gate>,
    accountant: &BudgetAccountant,
) {
    if session.transition(SessionStatus::Paused).is_ok() {
        (runtime.status_sink)(session);
    }
    let mut locked = snapshot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    locked.status = session.status;
    locked.per_story_gate = per_story_gate.clone();
    locked.budget = accountant.session_ledger().clone();
}

fn fail_session(session: &mut Session, runtime: &Runtime, snapshot: &Mutex<SessionSnapshot>) {
    if session.transition(SessionStatus::Failed).is_ok() {
        (runtime.status_sink)(session);
    }
    let mut locked = snapshot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    locked.status = session.status;
}

fn update_snapshot(snapshot: &Mutex<SessionSnapshot>, session: &Session, per_story_gate: &BTreeMap<String, Gate>, accountant: &BudgetAccountant) {
    let mut locked = snapshot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    locked.status = session.status;
    locked.per_story_gate = per_story_gate.clone();
    locked.budget = accountant.session_ledger().clone();
}

/// Builds and publishes a signal on the live bus, returning it so a caller
/// that is about to write a checkpoint can pass the same signal to
/// [`checkpoint`] and have it recorded durably in the same transaction as
/// the snapshot (§4.2's "single atomic transaction that also records the
/// triggering signal" invariant).
async fn emit(runtime: &Runtime, session_id: &SessionId, story_id: Option<StoryId>, kind: SignalKind, payload: Value, sequence: Sequence) -> Signal {
    let signal = Signal::new(
        SignalId::new(format!("{session_id}-{sequence}")),
        session_id.clone(),
        story_id,
        kind,
        "wave-server",
        runtime.clock.now(),
        payload,
        sequence,
    );
    if let Err(err) = runtime.bus.publish(signal.clone()).await {
        error!(session = %session_id, %err, "failed to publish orchestrator signal");
    }
    signal
}

async fn checkpoint(
    runtime: &Runtime,
    session: &Session,
    per_story_gate: &BTreeMap<String, Gate>,
    accountant: &BudgetAccountant,
    governor: &ContextGovernor,
    sequence: &mut SequenceCounter,
    triggering_signal: &Signal,
) {
    let gate = per_story_gate.values().copied().min().unwrap_or_else(Gate::first);
    let checkpoint = Checkpoint {
        session_id: session.id.clone(),
        sequence: sequence.next(),
        gate,
        per_story_gate: per_story_gate.clone(),
        budget: accountant.session_ledger().clone(),
        outstanding_dispatches: Vec::new(),
        context_summary: ContextSummary { pinned_keys: governor.pinned_keys(), total_tokens: governor.total_tokens() },
        extra: json!({"session_status": session.status}),
        created_at: runtime.clock.now(),
    };
    if let Err(err) = runtime.store.save_checkpoint(checkpoint, triggering_signal).await {
        error!(session = %session.id, %err, "failed to save checkpoint");
    }
}
