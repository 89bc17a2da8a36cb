// crates/ret-logic/src/lib.rs
// ============================================================================
// Module: RET Logic
// Description: Generic tri-state requirement trees with a compact DSL.
// Purpose: Give callers a reusable boolean-requirement evaluator that can
//          answer "true", "false", or "unknown" over domain-specific
//          condition types, without committing to any particular domain.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! `ret-logic` evaluates requirement trees built from an arbitrary condition
//! type `P`. A condition resolves to [`TriState::True`], [`TriState::False`],
//! or [`TriState::Unknown`] (the condition has not been observed yet), and the
//! tree combinators (`All`, `Any`, `AtLeast`, `Not`) propagate tri-state logic
//! the same way three-valued logic tables do. Callers that only have
//! yes/no/unknown facts available at evaluation time (acceptance criteria not
//! yet checked, a stop-condition not yet observed) get a correct answer
//! without forcing a premature decision.
//!
//! The [`dsl`] module parses a small textual grammar (`all(a, any(b, c))`)
//! into a [`Requirement`] tree, for callers that want to author requirements
//! as strings rather than building the tree in code.

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

pub mod dsl;
pub mod requirement;
pub mod tristate;
pub mod validate;

pub use dsl::ConditionResolver;
pub use dsl::DslError;
pub use dsl::parse_requirement;
pub use requirement::Requirement;
pub use tristate::TriState;
pub use validate::RequirementValidator;
pub use validate::ValidationError;
