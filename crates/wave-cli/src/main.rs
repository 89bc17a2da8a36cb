// crates/wave-cli/src/main.rs
// ============================================================================
// Binary: wave
// Description: The control binary (§6): `wave serve` runs the session
//              orchestrator and its HTTP control surface in-process; every
//              other subcommand is a thin client against a running server.
// Purpose: Give an operator (or a CI job) the minimal control surface named
//          in §6 without requiring them to speak HTTP/JSON directly.
// Dependencies: wave-server, wave-config, wave-core, clap, tokio
// ============================================================================

//! ## Overview
//! `wave` has exactly two shapes of subcommand: `serve`, which owns a
//! process (loads [`wave_config::RuntimeConfig`], connects a
//! [`wave_server::Runtime`], recovers any sessions the store reports
//! resumable, and binds the HTTP router from [`wave_server::http`]); and
//! every other subcommand, which is a one-shot HTTP request against a
//! *running* `wave serve` process.
//!
//! Exit codes follow §6: `0` clean shutdown, `1` usage error, `2` fatal
//! infrastructure error (bus/store unreachable at start), `3` configuration
//! invalid.

#![forbid(unsafe_code)]

mod client;
mod serve_policy;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use serde_json::Value;
use serde_json::json;
use tracing::error;
use tracing::info;
use wave_config::RuntimeConfig;
use wave_server::Runtime;
use wave_server::SessionOrchestrator;
use wave_server::http::build_router;

use crate::client::ClientError;
use crate::client::ControlClient;

/// The control binary's top-level CLI surface.
#[derive(Debug, Parser)]
#[command(name = "wave", version, about = "The WAVE orchestration control plane.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Starts the session orchestrator and its HTTP control surface.
    Serve(ServeArgs),
    /// Reports liveness and the count of active sessions.
    Health(ConnectArgs),
    /// Submits a new session with one or more story documents.
    StartSession(StartSessionArgs),
    /// Fetches a session's current status, gate map, and budget ledger.
    GetSession(SessionArgs),
    /// Pauses a running session before its next gate dispatch.
    PauseSession(SessionArgs),
    /// Resumes a paused session.
    ResumeSession(SessionArgs),
    /// Aborts a session with an operator-supplied reason.
    AbortSession(AbortArgs),
    /// Triggers an immediate, idempotent emergency stop.
    EmergencyStop(EmergencyStopArgs),
}

/// Arguments shared by every thin-client subcommand: where to find a running `wave serve`.
#[derive(Debug, Parser)]
struct ConnectArgs {
    /// Base URL of a running `wave serve` process.
    #[arg(long, default_value = "http://127.0.0.1:7878")]
    server: String,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    /// Path to the TOML configuration file (defaults per `WAVE_CONFIG`/`wave.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Allows binding to a non-loopback address without the environment
    /// variable opt-in (for tests and trusted deployments only).
    #[arg(long, default_value_t = false)]
    allow_non_loopback: bool,
}

#[derive(Debug, Parser)]
struct StartSessionArgs {
    #[command(flatten)]
    connect: ConnectArgs,
    /// Filesystem path of the project this session operates on.
    #[arg(long)]
    project_path: String,
    /// Path to a Story JSON document (§6's "Story format"); repeatable.
    #[arg(long = "story", required = true)]
    stories: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[command(flatten)]
    connect: ConnectArgs,
    /// The session identifier.
    session_id: String,
}

#[derive(Debug, Parser)]
struct AbortArgs {
    #[command(flatten)]
    connect: ConnectArgs,
    /// The session identifier.
    session_id: String,
    /// A human-readable reason, recorded in the audit log.
    #[arg(long)]
    reason: String,
}

#[derive(Debug, Parser)]
struct EmergencyStopArgs {
    #[command(flatten)]
    connect: ConnectArgs,
    /// The session identifier.
    session_id: String,
    /// A human-readable reason, recorded in the audit log.
    #[arg(long)]
    reason: String,
    /// The operator or system triggering the stop.
    #[arg(long)]
    actor: String,
}

/// Error wrapper distinguishing usage errors from operational failures, so
/// `main` can map each to the correct exit code from §6.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Configuration failed to load or validate.
    #[error("configuration invalid: {0}")]
    Config(#[from] wave_config::ConfigError),
    /// The configured bind address failed the local-only policy check.
    #[error(transparent)]
    ServePolicy(#[from] serve_policy::ServePolicyError),
    /// The signal bus or checkpoint store could not be reached at startup.
    #[error(transparent)]
    Runtime(#[from] wave_server::RuntimeError),
    /// An I/O operation (binding a socket, reading a story file) failed.
    #[error("io error: {0}")]
    Io(String),
    /// A thin-client request to a running server failed.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// A story document on disk was not valid JSON.
    #[error("story document {path} is not valid JSON: {source}")]
    InvalidStoryJson {
        /// Path of the offending file.
        path: PathBuf,
        /// The underlying parse error.
        source: serde_json::Error,
    },
}

impl CliError {
    /// Maps this error to the exit code §6 assigns to its category.
    const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::ServePolicy(_) => 3,
            Self::Runtime(_) => 2,
            Self::Io(_) | Self::Client(_) | Self::InvalidStoryJson { .. } => 1,
        }
    }
}

type CliResult<T> = Result<T, CliError>;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "wave command failed");
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => command_serve(args).await,
        Commands::Health(args) => command_health(args).await,
        Commands::StartSession(args) => command_start_session(args).await,
        Commands::GetSession(args) => command_session_op(args.connect, &args.session_id, "", None).await,
        Commands::PauseSession(args) => command_session_op(args.connect, &args.session_id, "/pause", Some(json!({}))).await,
        Commands::ResumeSession(args) => command_session_op(args.connect, &args.session_id, "/resume", Some(json!({}))).await,
        Commands::AbortSession(args) => {
            command_session_op(args.connect, &args.session_id, "/abort", Some(json!({"reason": args.reason}))).await
        }
        Commands::EmergencyStop(args) => {
            command_session_op(args.connect, &args.session_id, "/emergency-stop", Some(json!({"reason": args.reason, "actor": args.actor}))).await
        }
    }
}

/// Runs the session orchestrator and its HTTP control surface until a
/// shutdown signal (`Ctrl+C`) is received.
async fn command_serve(args: ServeArgs) -> CliResult<()> {
    let config = RuntimeConfig::load(args.config.as_deref())?;
    let allow_non_loopback = args.allow_non_loopback || serve_policy::resolve_allow_non_loopback();
    let bind_outcome = serve_policy::enforce_local_only(&config.server.bind_addr, allow_non_loopback)?;
    if bind_outcome.network_exposed {
        tracing::warn!(bind = %bind_outcome.bind_addr, "control surface bound to a non-loopback address");
    }

    let worker = wave_server::build_worker(&config);
    let runtime = Runtime::connect(config, worker).await?;
    let orchestrator = Arc::new(SessionOrchestrator::new(Arc::new(runtime)));
    let resumed = orchestrator.recover().await.map_err(|err| CliError::Io(err.to_string()))?;
    info!(resumed, "recovered sessions from checkpoint store");

    let router = build_router(Arc::clone(&orchestrator));
    let listener = tokio::net::TcpListener::bind(bind_outcome.bind_addr).await.map_err(|err| CliError::Io(err.to_string()))?;
    info!(addr = %bind_outcome.bind_addr, "wave control surface listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| CliError::Io(err.to_string()))?;
    info!("wave control surface shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn command_health(connect: ConnectArgs) -> CliResult<()> {
    let client = ControlClient::new(connect.server);
    let body = client.get("/health").await?;
    print_json(&body);
    Ok(())
}

async fn command_start_session(args: StartSessionArgs) -> CliResult<()> {
    let mut stories = Vec::with_capacity(args.stories.len());
    for path in &args.stories {
        let contents = std::fs::read_to_string(path).map_err(|err| CliError::Io(format!("{}: {err}", path.display())))?;
        let document: Value = serde_json::from_str(&contents).map_err(|err| CliError::InvalidStoryJson { path: path.clone(), source: err })?;
        stories.push(document);
    }
    let client = ControlClient::new(args.connect.server);
    let body = client.post("/sessions", &json!({"project_path": args.project_path, "stories": stories})).await?;
    print_json(&body);
    Ok(())
}

/// Dispatches a session-scoped operation: `GET /sessions/{id}` when `body`
/// is `None`, otherwise `POST /sessions/{id}{suffix}` with `body`.
async fn command_session_op(connect: ConnectArgs, session_id: &str, suffix: &str, body: Option<Value>) -> CliResult<()> {
    let client = ControlClient::new(connect.server);
    let response = match body {
        Some(body) => client.post(&format!("/sessions/{session_id}{suffix}"), &body).await?,
        None => client.get(&format!("/sessions/{session_id}")).await?,
    };
    print_json(&response);
    Ok(())
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}
