// crates/wave-core/src/capability.rs
// ============================================================================
// Module: Capability Traits
// Description: The minimal interfaces every backend-specific implementation
//              must satisfy: Worker, Store, Bus, Vcs.
// Purpose: Let the core depend only on these capability sets, not on any
//          concrete backend, per the polymorphism design note in §9 — no
//          component calls back into the orchestrator; it returns a result
//          or publishes a signal.
// Dependencies: async-trait, crate::{checkpoint, ids, safety, signal, workspace}
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;

use crate::checkpoint::Checkpoint;
use crate::ids::SessionId;
use crate::ids::StoryId;
use crate::ids::WorkspaceId;
use crate::ids::Sequence;
use crate::signal::Signal;
use crate::story::Story;
use crate::workspace::Workspace;

/// A single turn's worth of output from an external worker invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerTurn {
    /// Free-form text output from the worker (for logging/summary).
    pub narration: String,
    /// File paths the worker proposes to write, with their full new content.
    pub proposed_writes: Vec<(String, String)>,
    /// Shell commands the worker proposes to run.
    pub proposed_commands: Vec<String>,
    /// Tokens consumed on this turn.
    pub tokens_in: u64,
    /// Tokens produced on this turn.
    pub tokens_out: u64,
    /// `true` iff the worker signaled it is done for this dispatch.
    pub done: bool,
}

/// Why a worker invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The worker finished normally.
    Completed,
    /// The worker process crashed or exited non-zero.
    Crashed,
    /// The worker was killed by the caller (timeout, safety block, emergency stop).
    Killed,
}

/// The external, LLM-driven code-generating process WAVE invokes and bounds.
///
/// This is the one capability the spec explicitly puts out of scope for the
/// core's own implementation (§1): WAVE only needs to invoke it, read its
/// turns, and kill it. A test double or a thin process-spawning adapter both
/// satisfy this trait identically as far as the dispatcher is concerned.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Invokes the worker for one turn within a dispatch, given the story,
    /// role, and accumulated context (already bounded by the context
    /// governor and already screened for secrets it must not see).
    async fn invoke(&self, story: &Story, role: &str, context: &Value) -> Result<WorkerTurn, WorkerError>;

    /// Terminates an in-flight worker invocation. Must be safe to call
    /// even if the worker has already exited.
    async fn kill(&self) -> WorkerExit;
}

/// Error returned by a worker invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// The worker process failed to start or crashed mid-turn.
    #[error("worker process failed: {0}")]
    ProcessFailure(String),
    /// The worker produced output that could not be parsed into a turn.
    #[error("worker produced malformed output: {0}")]
    MalformedOutput(String),
}

/// The durable checkpoint and audit-log backend (C2).
#[async_trait]
pub trait Store: Send + Sync {
    /// Persists a checkpoint and its triggering signal in a single
    /// transaction, returning the checkpoint's assigned sequence number.
    async fn save_checkpoint(&self, checkpoint: Checkpoint, triggering_signal: &Signal) -> Result<Sequence, StoreError>;

    /// Loads the latest checkpoint for a session and any signals recorded
    /// strictly after that checkpoint's sequence.
    async fn load_latest(&self, session_id: &SessionId) -> Result<Option<(Checkpoint, Vec<Signal>)>, StoreError>;

    /// Appends an audit-log entry not tied to a checkpoint write.
    async fn append_audit(&self, signal: &Signal) -> Result<(), StoreError>;

    /// Lists every session whose last known status was `running` or `paused`,
    /// for crash-recovery enumeration at process start.
    async fn list_resumable_sessions(&self) -> Result<Vec<SessionId>, StoreError>;
}

/// Error returned by the checkpoint store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store is temporarily unavailable; retry with backoff.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A stored checkpoint failed to deserialize or violated an invariant.
    #[error("corrupt checkpoint for session {session_id}: {reason}")]
    Corrupt {
        /// The session whose checkpoint is corrupt.
        session_id: SessionId,
        /// Why the checkpoint was rejected.
        reason: String,
    },
}

/// The durable, at-least-once signal bus (C1).
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publishes a signal. May fail with a retryable error if the bus is
    /// temporarily unavailable.
    async fn publish(&self, signal: Signal) -> Result<(), BusError>;

    /// Returns every signal for `session_id` with `sequence > from_sequence`,
    /// in strict sequence order.
    async fn subscribe(&self, session_id: &SessionId, from_sequence: Sequence) -> Result<Vec<Signal>, BusError>;

    /// Acknowledges processing up to and including `sequence`, advancing the
    /// consumer's redelivery watermark.
    async fn acknowledge(&self, session_id: &SessionId, sequence: Sequence) -> Result<(), BusError>;
}

/// Error returned by the signal bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The bus is temporarily unavailable; retry with exponential backoff.
    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

/// The version-control provider (C6's backing implementation): branching,
/// worktree materialization, diffing, and merging.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Materializes an isolated working copy of `base_revision` on a new
    /// branch dedicated to `story_id`, returning the [`Workspace`] descriptor.
    async fn materialize(&self, story: &Story, base_revision: &str) -> Result<Workspace, VcsError>;

    /// Returns the set of paths modified in `workspace` relative to its base revision.
    async fn diff(&self, workspace: &Workspace) -> Result<Vec<String>, VcsError>;

    /// Releases a workspace, preserving its branch for later inspection or
    /// integration by the orchestrator.
    async fn release(&self, workspace_id: &WorkspaceId) -> Result<(), VcsError>;

    /// Merges a workspace's branch into the mainline branch.
    async fn merge(&self, workspace: &Workspace, into: &str) -> Result<(), VcsError>;
}

/// Error returned by the VCS provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VcsError {
    /// Two concurrent allocations raced for the same story; the loser must retry after jitter.
    #[error("concurrent allocation race for story {story_id}")]
    AllocationRace {
        /// The story both allocations targeted.
        story_id: StoryId,
    },
    /// The underlying VCS operation failed.
    #[error("vcs operation failed: {0}")]
    OperationFailed(String),
    /// A merge could not be completed cleanly.
    #[error("merge conflict for workspace {workspace_id}")]
    MergeConflict {
        /// The workspace whose branch failed to merge.
        workspace_id: WorkspaceId,
    },
}
