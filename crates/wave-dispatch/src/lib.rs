// crates/wave-dispatch/src/lib.rs
// ============================================================================
// Crate: wave-dispatch
// Description: The workspace provider (C6), agent dispatcher (C8), and retry
//              controller (C9): the components that actually run a worker
//              invocation inside a sandboxed, domain-bounded workspace.
// Purpose: Give the session orchestrator one crate to depend on for every
//          effect that touches a worker process or a project worktree.
// ============================================================================

//! ## Overview
//! `wave-dispatch` wires three things together: a real, `cap-std`-sandboxed
//! write path for whatever a worker proposes ([`workspace`]), pluggable `Vcs`
//! backends that materialize and diff per-story worktrees ([`vcs`]), and the
//! dispatch/retry control flow of §4.8–§4.9 ([`agent`], [`retry`]). None of
//! it calls back into a session orchestrator: every terminal state is either
//! a returned [`agent::DispatchOutcome`] or a published `wave_core::Signal`,
//! per the no-cyclic-callback design note in §9.

#![forbid(unsafe_code)]
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_docs_in_private_items,
        missing_docs,
        reason = "test modules assert with unwrap/expect; doc lints don't apply to test-only code"
    )
)]

pub mod agent;
pub mod emergency;
pub mod retry;
pub mod vcs;
pub mod worker;
pub mod workspace;

pub use agent::AgentDispatcher;
pub use agent::DispatchError;
pub use agent::DispatchOutcome;
pub use emergency::EmergencyStop;
pub use retry::DEFAULT_MAX_ATTEMPTS;
pub use retry::RetryController;
pub use retry::RetryOutcome;
pub use vcs::GitVcs;
pub use vcs::InMemoryVcs;
pub use worker::ProcessWorker;
pub use workspace::WorkspaceIoError;
pub use workspace::apply_writes;
