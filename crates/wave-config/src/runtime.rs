// crates/wave-config/src/runtime.rs
// ============================================================================
// Module: Runtime Configuration
// Description: TOML-backed configuration for the session orchestrator:
//              worker model assignments, cost rates, bus/store connections,
//              global budget caps, and the control server bind address.
// Purpose: Provide strict, fail-closed config parsing, mirroring the
//          teacher's `toml`-based config crate, with `WAVE_`-prefixed
//          environment overrides for secrets and deployment-specific paths.
// Dependencies: wave-core, serde, toml
// ============================================================================

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use wave_core::ModelRate;

/// Environment variable prefix recognized for configuration overrides.
pub const CONFIG_ENV_PREFIX: &str = "WAVE_";
/// Environment variable used to override the config file path.
const CONFIG_PATH_VAR: &str = "WAVE_CONFIG";
/// Maximum configuration file size accepted, in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "wave.toml";

/// Bus backend connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BusConfig {
    /// Connection string for the signal bus (e.g. a sqlite path or in-memory marker).
    #[serde(default = "default_bus_url")]
    pub url: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { url: default_bus_url() }
    }
}

fn default_bus_url() -> String {
    "memory://".to_string()
}

/// Checkpoint store backend connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    /// Connection string for the checkpoint store (e.g. a sqlite path).
    #[serde(default = "default_store_url")]
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { url: default_store_url() }
    }
}

fn default_store_url() -> String {
    "memory://".to_string()
}

/// The `wave serve` HTTP control server's bind configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Address the axum control server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: default_bind_addr() }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:7878".to_string()
}

/// The external worker process the dispatcher invokes for every turn (§1:
/// out of scope to implement, but the command to launch it is ours to
/// configure).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Executable invoked once per dispatch.
    #[serde(default = "default_worker_command")]
    pub command: String,
    /// Arguments passed to the worker executable.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { command: default_worker_command(), args: Vec::new() }
    }
}

fn default_worker_command() -> String {
    "wave-worker".to_string()
}

/// Which [`wave_core::Vcs`] backend the workspace provider materializes
/// workspaces with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsBackend {
    /// `git worktree`-backed, one worktree per allocated workspace.
    Git,
    /// In-process fake; no filesystem or git binary required.
    Memory,
}

/// Version-control provider configuration (§4.6).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct VcsConfig {
    /// Which backend to materialize workspaces with.
    #[serde(default = "default_vcs_backend")]
    pub backend: VcsBackend,
    /// The canonical checkout new worktrees are materialized from (git backend only).
    #[serde(default)]
    pub repo_root: PathBuf,
    /// Directory new worktrees are materialized under (git backend only).
    #[serde(default)]
    pub workspace_root: PathBuf,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self { backend: default_vcs_backend(), repo_root: PathBuf::new(), workspace_root: PathBuf::new() }
    }
}

const fn default_vcs_backend() -> VcsBackend {
    VcsBackend::Memory
}

/// Global, cross-session budget ceilings.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetConfig {
    /// Hard cap, in USD micro-dollars, any single session's ledger may reach.
    #[serde(default = "default_session_cap_micros")]
    pub session_cap_micros: u64,
    /// Default per-story attempt ceiling for the retry controller, unless a
    /// story overrides it.
    #[serde(default = "default_max_retry_attempts")]
    pub default_max_retry_attempts: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            session_cap_micros: default_session_cap_micros(),
            default_max_retry_attempts: default_max_retry_attempts(),
        }
    }
}

const fn default_session_cap_micros() -> u64 {
    50_000_000
}

const fn default_max_retry_attempts() -> u32 {
    wave_dispatch_default_max_attempts()
}

/// Mirrors `wave_dispatch::DEFAULT_MAX_ATTEMPTS` without creating a
/// dependency cycle (`wave-dispatch` does not depend on `wave-config`).
const fn wave_dispatch_default_max_attempts() -> u32 {
    3
}

/// Everything the session orchestrator needs to start a process: worker
/// model assignments, cost rates, bus/store connections, budget caps, the
/// control server bind address, and an optional emergency-stop sentinel
/// directory.
///
/// # Invariants
/// - `models` must contain an entry for every role a submitted story
///   assigns; the orchestrator rejects a story whose role has no configured
///   model rather than silently falling back to a default model.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Signal bus connection.
    #[serde(default)]
    pub bus: BusConfig,
    /// Checkpoint store connection.
    #[serde(default)]
    pub store: StoreConfig,
    /// Control server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Global budget ceilings.
    #[serde(default)]
    pub budget: BudgetConfig,
    /// External worker process configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Version-control provider configuration.
    #[serde(default)]
    pub vcs: VcsConfig,
    /// Per-role worker model identifiers, e.g. `{"backend-1": "gpt-x"}`.
    #[serde(default)]
    pub models: HashMap<String, String>,
    /// Per-model cost rate table.
    #[serde(default)]
    pub rates: HashMap<String, ModelRate>,
    /// Directory watched for an emergency-stop sentinel file per session
    /// (`<dir>/<session-id>.stop`). `None` disables file-based triggering;
    /// the in-memory control-surface trigger is always available.
    #[serde(default)]
    pub emergency_stop_dir: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Loads configuration from `path`, or from `WAVE_CONFIG`, or from
    /// `wave.toml` in the current directory if neither is given, then
    /// applies `WAVE_`-prefixed environment overrides and validates.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read, is not valid
    /// UTF-8 TOML, or fails [`RuntimeConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes).map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies `WAVE_BUS_URL`, `WAVE_STORE_URL`, `WAVE_BIND_ADDR`, and
    /// `WAVE_BUDGET_SESSION_CAP_MICROS` overrides when set, per §6's
    /// "Environment variables override file values for secrets and
    /// deployment-specific paths".
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup function, so the override
    /// logic is testable without mutating real process environment
    /// variables (which would require `unsafe` under the 2024 edition).
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("WAVE_BUS_URL") {
            self.bus.url = value;
        }
        if let Some(value) = lookup("WAVE_STORE_URL") {
            self.store.url = value;
        }
        if let Some(value) = lookup("WAVE_BIND_ADDR") {
            self.server.bind_addr = value;
        }
        if let Some(value) = lookup("WAVE_BUDGET_SESSION_CAP_MICROS") {
            if let Ok(parsed) = value.parse() {
                self.budget.session_cap_micros = parsed;
            }
        }
        if let Some(value) = lookup("WAVE_EMERGENCY_STOP_DIR") {
            self.emergency_stop_dir = Some(PathBuf::from(value));
        }
    }

    /// Validates internal consistency: a non-zero budget cap, a parseable
    /// bind address, and a cost rate entry for every assigned model.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget.session_cap_micros == 0 {
            return Err(ConfigError::Invalid("budget.session_cap_micros must be greater than zero".to_string()));
        }
        if self.budget.default_max_retry_attempts == 0 {
            return Err(ConfigError::Invalid("budget.default_max_retry_attempts must be greater than zero".to_string()));
        }
        self.server.bind_addr.parse::<std::net::SocketAddr>().map_err(|_| ConfigError::Invalid("server.bind_addr is not a valid socket address".to_string()))?;
        for (role, model) in &self.models {
            if !self.rates.contains_key(model) {
                return Err(ConfigError::Invalid(format!("role {role} assigned model {model} with no entry in [rates]")));
            }
        }
        if self.vcs.backend == VcsBackend::Git && self.vcs.repo_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("vcs.repo_root is required when vcs.backend is \"git\"".to_string()));
        }
        Ok(())
    }
}

/// Error returned by configuration loading or validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// I/O failure while reading the configuration file.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Resolves the config path from the explicit argument, `WAVE_CONFIG`, or
/// the default filename, in that order.
fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    if let Ok(env_path) = env::var(CONFIG_PATH_VAR) {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_CONFIG_NAME)
}
