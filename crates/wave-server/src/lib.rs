// crates/wave-server/src/lib.rs
// ============================================================================
// Crate: wave-server
// Description: The session orchestrator (C10) and its HTTP control surface.
// Purpose: Give `wave-cli`'s `serve` subcommand (and any other embedder) a
//          single `Runtime::connect` + `SessionOrchestrator` + `build_router`
//          sequence to stand up the control plane described in §4.10 and §6.
// ============================================================================

//! ## Overview
//! `wave-server` wires every other crate in the workspace together. It owns
//! no policy of its own: [`runtime::Runtime`] resolves which backends a
//! deployment is configured for, [`orchestrator::SessionOrchestrator`] drives
//! sessions against those backends, and [`http::build_router`] exposes the
//! orchestrator's operations as the JSON control surface described in §6.

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

pub mod http;
pub mod orchestrator;
pub mod runtime;

pub use orchestrator::OrchestratorError;
pub use orchestrator::SessionOrchestrator;
pub use orchestrator::SessionSnapshot;
pub use runtime::Runtime;
pub use runtime::RuntimeError;
pub use runtime::build_worker;
