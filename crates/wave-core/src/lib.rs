// crates/wave-core/src/lib.rs
// ============================================================================
// Crate: wave-core
// Description: Shared data model, capability traits, and the gate state
//              machine for the WAVE control plane.
// Purpose: Every other workspace crate depends on this one for its domain
//          types; this crate depends on nothing else in the workspace but
//          ret-logic, so it can never form a cycle.
// ============================================================================

//! ## Overview
//! `wave-core` defines the plain-data types shared by every WAVE component
//! (sessions, stories, gates, signals, budgets, safety verdicts, workspaces,
//! checkpoints) and the capability traits ([`capability::Worker`],
//! [`capability::Store`], [`capability::Bus`], [`capability::Vcs`]) that let
//! the rest of the workspace depend on behavior without depending on a
//! specific backend.
//!
//! Nothing in this crate calls back into an orchestrator: components either
//! return a `Result` or publish a [`signal::Signal`]. That rule is what keeps
//! the dependency graph a DAG instead of a web of mutual callbacks.

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
        reason = "test modules assert with unwrap/panic; doc lints don't apply to test-only code"
    )
)]

pub mod budget;
pub mod capability;
pub mod checkpoint;
pub mod error;
pub mod gate;
pub mod ids;
pub mod safety;
pub mod signal;
pub mod session;
pub mod story;
pub mod time;
pub mod workspace;

pub use budget::BudgetLedger;
pub use budget::ModelRate;
pub use budget::ThresholdLevel;
pub use capability::Bus;
pub use capability::BusError;
pub use capability::Store;
pub use capability::StoreError;
pub use capability::Vcs;
pub use capability::VcsError;
pub use capability::Worker;
pub use capability::WorkerError;
pub use capability::WorkerExit;
pub use capability::WorkerTurn;
pub use checkpoint::Checkpoint;
pub use checkpoint::ContextSummary;
pub use checkpoint::OutstandingDispatch;
pub use error::CoreError;
pub use gate::Gate;
pub use gate::GateSequence;
pub use gate::GateViolation;
pub use ids::ProjectId;
pub use ids::Sequence;
pub use ids::SessionId;
pub use ids::SignalId;
pub use ids::StoryId;
pub use ids::WorkspaceId;
pub use safety::Recommendation;
pub use safety::SafetyVerdict;
pub use safety::Violation;
pub use safety::ViolationKind;
pub use session::Session;
pub use session::SessionStatus;
pub use session::SessionTransitionError;
pub use signal::Signal;
pub use signal::SignalKind;
pub use story::Domain;
pub use story::FilePolicy;
pub use story::Objective;
pub use story::Role;
pub use story::Story;
pub use story::StoryThresholds;
pub use story::StoryValidationError;
pub use time::Clock;
pub use time::FixedClock;
pub use time::SystemClock;
pub use time::Timestamp;
pub use workspace::BoundaryCheck;
pub use workspace::Workspace;
