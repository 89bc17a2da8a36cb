// crates/wave-server/src/runtime.rs
// ============================================================================
// Module: Runtime
// Description: The single value every component is threaded through at
//              process start, replacing process-wide singletons (§9).
// Purpose: Wire the signal bus, checkpoint store, vcs provider, and worker
//          capability from `RuntimeConfig` into the concrete collaborators
//          `SessionOrchestrator` drives, and fail closed (exit codes 2/3 in
//          `main`) when a backend is unreachable or the config is invalid.
// Dependencies: wave-core, wave-config, wave-store, wave-dispatch
// ============================================================================

use std::sync::Arc;

use wave_config::ConfigError;
use wave_config::RuntimeConfig;
use wave_config::VcsBackend;
use wave_core::Bus;
use wave_core::Clock;
use wave_core::Session;
use wave_core::Store;
use wave_core::SystemClock;
use wave_core::Vcs;
use wave_core::Worker;
use wave_dispatch::GitVcs;
use wave_dispatch::InMemoryVcs;
use wave_dispatch::ProcessWorker;
use wave_store::InMemoryBus;
use wave_store::InMemoryStore;

/// Error constructing a [`Runtime`] from configuration (§7: "fatal
/// infrastructure error" and "configuration invalid" map to distinct exit
/// codes in the control binary).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The config failed validation before any backend was touched.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The checkpoint store or signal bus could not be reached at startup.
    #[error("infrastructure unreachable: {0}")]
    Infrastructure(String),
}

/// A hook that records a session's current status with the store backend,
/// for backends (the in-memory one) whose `list_resumable_sessions` does
/// not derive status from checkpoint content the way `SqliteStore` does
/// (see `wave_store::sqlite::SESSION_STATUS_EXTRA_KEY`).
pub type StatusSink = Arc<dyn Fn(&Session) + Send + Sync>;

/// Every collaborator the session orchestrator needs, constructed once at
/// process start and threaded through rather than reached for as a global.
pub struct Runtime {
    /// The durable checkpoint store (C2).
    pub store: Arc<dyn Store>,
    /// The durable signal bus (C1).
    pub bus: Arc<dyn Bus>,
    /// The version-control provider backing workspace allocation (C6).
    pub vcs: Arc<dyn Vcs>,
    /// The external worker capability (out of scope to implement; §1).
    pub worker: Arc<dyn Worker>,
    /// Source of timestamps.
    pub clock: Arc<dyn Clock>,
    /// The configuration this runtime was built from.
    pub config: RuntimeConfig,
    /// Records session status for backends that need it recorded
    /// out-of-band from the checkpoint write.
    pub status_sink: StatusSink,
}

impl Runtime {
    /// Builds a `Runtime` from `config`, confirming the store/bus backend is
    /// reachable before returning.
    ///
    /// # Errors
    /// Returns [`RuntimeError::Infrastructure`] if the configured store
    /// cannot be opened or queried; `config` itself is assumed already
    /// validated by [`RuntimeConfig::load`].
    pub async fn connect(config: RuntimeConfig, worker: Arc<dyn Worker>) -> Result<Self, RuntimeError> {
        config.validate()?;
        let (store, bus, status_sink) = build_store_and_bus(&config)?;
        store.list_resumable_sessions().await.map_err(|err| RuntimeError::Infrastructure(err.to_string()))?;
        let vcs = build_vcs(&config);
        Ok(Self { store, bus, vcs, worker, clock: Arc::new(SystemClock), config, status_sink })
    }

    /// Builds a `Runtime` over in-memory backends and a caller-supplied
    /// worker, for tests and single-process demos that need no
    /// configuration file at all.
    #[must_use]
    pub fn in_memory(config: RuntimeConfig, worker: Arc<dyn Worker>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let sink_store = Arc::clone(&store);
        let status_sink: StatusSink = Arc::new(move |session: &Session| sink_store.set_session_status(session));
        Self { store, bus, vcs: Arc::new(InMemoryVcs::new(0)), worker, clock: Arc::new(SystemClock), config, status_sink }
    }
}

/// Resolves the store/bus backend from `config.store.url`: `"memory://"`
/// selects the in-memory pair; a `"sqlite://<path>"` URL opens a durable
/// pair sharing one writer thread (§4.1, §4.2). The signal bus is always
/// colocated with the checkpoint store; `config.bus.url` is reserved for a
/// future deployment that splits them onto separate backends and is
/// otherwise ignored today.
fn build_store_and_bus(config: &RuntimeConfig) -> Result<(Arc<dyn Store>, Arc<dyn Bus>, StatusSink), RuntimeError> {
    if let Some(path) = config.store.url.strip_prefix("sqlite://") {
        let (store, bus) = wave_store::sqlite::open(path).map_err(|err| RuntimeError::Infrastructure(err.to_string()))?;
        let noop: StatusSink = Arc::new(|_session: &Session| {});
        return Ok((Arc::new(store), Arc::new(bus), noop));
    }
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let sink_store = Arc::clone(&store);
    let status_sink: StatusSink = Arc::new(move |session: &Session| sink_store.set_session_status(session));
    Ok((store, bus, status_sink))
}

/// Resolves the `Vcs` backend from `config.vcs`.
fn build_vcs(config: &RuntimeConfig) -> Arc<dyn Vcs> {
    match config.vcs.backend {
        VcsBackend::Git => Arc::new(GitVcs::new(config.vcs.repo_root.clone(), config.vcs.workspace_root.clone())),
        VcsBackend::Memory => Arc::new(InMemoryVcs::new(0)),
    }
}

/// Builds the configured external worker process capability.
#[must_use]
pub fn build_worker(config: &RuntimeConfig) -> Arc<dyn Worker> {
    Arc::new(ProcessWorker::new(config.worker.command.clone(), config.worker.args.clone()))
}
