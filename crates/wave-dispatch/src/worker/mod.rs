// crates/wave-dispatch/src/worker/mod.rs
// ============================================================================
// Module: Worker Implementations
// Description: Concrete backends for wave-core's `Worker` capability trait.
// Purpose: Give the Agent Dispatcher (C8) a real subprocess-based worker
//          invocation and, in tests, a scripted in-memory fake.
// Dependencies: wave-core::capability::Worker
// ============================================================================

pub mod process;

pub use process::ProcessWorker;
