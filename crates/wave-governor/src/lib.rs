// crates/wave-governor/src/lib.rs
// ============================================================================
// Crate: wave-governor
// Description: The context governor (C4) and the budget accountant (C5).
// Purpose: Bound what a worker invocation sees (context cache, §4.4) and
//          what it is allowed to spend (token/cost ledgers, §4.5), so the
//          dispatcher enforces both without owning either policy itself.
// ============================================================================

//! ## Overview
//! `wave-governor` has no single analog in the teacher codebase's crate
//! graph; its two modules are grounded independently. [`cache::ContextGovernor`]
//! is a fresh, in-memory LRU-with-pinning structure (no teacher file carries
//! an LRU cache; this crate introduces one, sized and documented the way
//! this workspace documents small single-purpose modules). [`accountant::BudgetAccountant`]
//! wraps the ledger types already defined in `wave_core::budget` with the
//! per-model rate lookup and dual session/story accounting the dispatcher
//! needs on every worker turn.

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

pub mod accountant;
pub mod cache;

pub use accountant::AccountantError;
pub use accountant::BudgetAccountant;
pub use accountant::RecordOutcome;
pub use cache::ContextGovernor;
pub use cache::DEFAULT_CAP_TOKENS;
pub use cache::GovernorError;
pub use cache::estimate_tokens;
