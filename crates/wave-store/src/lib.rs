// crates/wave-store/src/lib.rs
// ============================================================================
// Crate: wave-store
// Description: The checkpoint store (C2) and signal bus (C1) implementations
//              the rest of the workspace drives only through wave-core's
//              `Store` and `Bus` capability traits.
// Purpose: Give the session orchestrator a durable, crash-recoverable
//          backend and an in-memory one for tests and single-process runs,
//          sharing one single-writer-thread gateway pattern (§4.1, §4.2).
// ============================================================================

//! ## Overview
//! `wave-store` is grounded on the teacher's durable SQLite store: a single
//! writer connection behind a dedicated thread draining a bounded command
//! queue, WAL journaling, a busy-timeout, and content-hash verification on
//! read so a corrupt row is detectable rather than silently accepted. The
//! teacher's store persisted one domain's run-state snapshots; this crate
//! persists WAVE's [`wave_core::Checkpoint`] snapshots and the per-session
//! signal log on the same writer thread, because both need exactly the same
//! transactional guarantee: a checkpoint write and its triggering signal
//! commit together, or not at all (§4.2).
//!
//! [`memory`] provides the in-memory counterparts used by unit tests, the
//! dispatcher's own test suite, and single-process deployments that do not
//! need cross-restart durability.

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

pub mod memory;
pub mod sqlite;
mod writer;

pub use memory::InMemoryBus;
pub use memory::InMemoryStore;
pub use sqlite::SqliteBus;
pub use sqlite::SqliteStore;
pub use sqlite::SqliteStoreError;
