// crates/wave-safety/src/lib.rs
// ============================================================================
// Crate: wave-safety
// Description: The safety evaluator (C3): a pure, stateless rule engine that
//              scores proposed worker output and flags violations.
// Purpose: Give the dispatcher a single `evaluate` entry point whose verdict
//          is reproducible and independent of process state (§4.3).
// ============================================================================

//! ## Overview
//! `wave-safety` has no analog in the teacher codebase's crate graph; it is
//! new, grounded on the regex-classifier shape used for compiler-error
//! categorization elsewhere in the retrieved example pack (static
//! `LazyLock<Regex>` tables, one classifier function per category) rather
//! than on a general rule DSL. Stop-condition evaluation is the one category
//! that is *not* regex-driven: it reuses [`ret_logic::Requirement`], the same
//! tri-state evaluator the rest of the workspace uses for acceptance
//! criteria, so both surfaces share one boolean-requirement grammar.
//!
//! Every category function is independently unit-tested; [`evaluator::evaluate`]
//! is the only public entry point callers outside this crate should use.

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

mod boundary;
mod destructive;
mod evaluator;
mod injection;
mod secrets;
mod stop_condition;

pub use evaluator::EvaluationInput;
pub use evaluator::evaluate;
