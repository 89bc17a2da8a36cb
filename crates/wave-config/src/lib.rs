// crates/wave-config/src/lib.rs
// ============================================================================
// Crate: wave-config
// Description: Runtime configuration loading (TOML + environment overrides)
//              and JSON-Schema validation of submitted Story documents.
// Purpose: Give the control binary and the HTTP control server one place to
//          load everything the session orchestrator needs to start: worker
//          model ids, cost rates, bus/store connection strings, and global
//          budget caps (§6's "Environment" stanza).
// ============================================================================

//! ## Overview
//! `wave-config` owns two unrelated but equally "boundary" concerns: loading
//! [`RuntimeConfig`] from TOML with `WAVE_`-prefixed environment overrides,
//! and validating a submitted Story JSON document against the schema in
//! [`story_schema`] before `wave-core` ever constructs a [`wave_core::Story`]
//! value. Both fail closed: a missing or malformed config, or a Story
//! document that does not match the schema, is rejected rather than
//! defaulted.

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

mod intake;
mod runtime;
mod schema;

pub use intake::IntakeError;
pub use intake::story_from_document;
pub use runtime::BudgetConfig;
pub use runtime::BusConfig;
pub use runtime::CONFIG_ENV_PREFIX;
pub use runtime::ConfigError;
pub use runtime::RuntimeConfig;
pub use runtime::ServerConfig;
pub use runtime::StoreConfig;
pub use runtime::VcsBackend;
pub use runtime::VcsConfig;
pub use runtime::WorkerConfig;
pub use schema::SchemaError;
pub use schema::StoryValidator;
pub use schema::story_schema;
