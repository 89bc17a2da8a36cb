// crates/wave-server/src/http.rs
// ============================================================================
// Module: HTTP Control Surface
// Description: JSON-over-HTTP router exposing §6's control surface:
//              health, start-session, get-session, pause/resume/abort, and
//              emergency-stop.
// Purpose: Give `wave serve` (and any other embedder) a single
//          `build_router(orchestrator)` call to stand up the control plane.
//          Every handler is a thin translation from JSON to
//          `SessionOrchestrator` calls; no policy lives here.
// Dependencies: axum, wave-core, wave-config, serde_json
// ============================================================================

//! ## Overview
//! Routes mirror §6 one-for-one. The story submission body is validated
//! against [`wave_config::story_schema`] before [`wave_config::story_from_document`]
//! ever constructs a [`wave_core::Story`], so a malformed story is rejected
//! at the HTTP boundary rather than deep inside the orchestrator.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path as AxumPath;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use wave_config::IntakeError;
use wave_config::SchemaError;
use wave_config::StoryValidator;
use wave_config::story_from_document;
use wave_core::ProjectId;
use wave_core::SessionId;
use wave_core::Story;

use crate::orchestrator::OrchestratorError;
use crate::orchestrator::SessionOrchestrator;
use crate::orchestrator::SessionSnapshot;

/// Shared state every handler closes over: the orchestrator and a reusable
/// compiled story schema validator (§6's "Validation rejects stories
/// violating these minima").
struct AppState {
    orchestrator: Arc<SessionOrchestrator>,
    validator: StoryValidator,
}

/// Builds the axum [`Router`] exposing every operation in §6 over `orchestrator`.
///
/// # Panics
/// Panics if [`wave_config::story_schema`] fails to compile, which would
/// indicate a programmer error in the schema literal rather than anything
/// caller-controlled.
#[must_use]
pub fn build_router(orchestrator: Arc<SessionOrchestrator>) -> Router {
    let validator = StoryValidator::new().unwrap_or_else(|err| unreachable!("story schema must compile: {err}"));
    let state = Arc::new(AppState { orchestrator, validator });
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(start_session))
        .route("/sessions/{session_id}", get(get_session))
        .route("/sessions/{session_id}/pause", post(pause_session))
        .route("/sessions/{session_id}/resume", post(resume_session))
        .route("/sessions/{session_id}/abort", post(abort_session))
        .route("/sessions/{session_id}/emergency-stop", post(emergency_stop))
        .with_state(state)
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    active_sessions: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", active_sessions: state.orchestrator.active_session_count() })
}

/// Request body for `POST /sessions` (§6's `start-session(project-path, stories[])`).
#[derive(Debug, Deserialize)]
struct StartSessionRequest {
    project_path: String,
    stories: Vec<Value>,
}

/// Response body for `POST /sessions`.
#[derive(Debug, Serialize)]
struct StartSessionResponse {
    session_id: String,
}

/// An error response shape shared by every handler that can fail,
/// distinguishing client-caused (`4xx`) from server-caused (`5xx`) failure.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

async fn start_session(State(state): State<Arc<AppState>>, Json(request): Json<StartSessionRequest>) -> Response {
    let project = ProjectId::new(request.project_path.clone());
    let mut stories: Vec<Story> = Vec::with_capacity(request.stories.len());
    for document in &request.stories {
        if let Err(err) = state.validator.validate(document) {
            return error_response(StatusCode::BAD_REQUEST, schema_error_message(&err));
        }
        match story_from_document(&project, document) {
            Ok(story) => stories.push(story),
            Err(err) => return error_response(StatusCode::BAD_REQUEST, intake_error_message(&err)),
        }
    }
    match state.orchestrator.start_session(project, stories, request.project_path) {
        Ok(session_id) => Json(StartSessionResponse { session_id: session_id.as_str().to_string() }).into_response(),
        Err(err) => orchestrator_error_response(&err),
    }
}

async fn get_session(State(state): State<Arc<AppState>>, AxumPath(session_id): AxumPath<String>) -> Response {
    match state.orchestrator.get_session(&SessionId::new(session_id)) {
        Ok(snapshot) => Json(snapshot_to_json(&snapshot)).into_response(),
        Err(err) => orchestrator_error_response(&err),
    }
}

async fn pause_session(State(state): State<Arc<AppState>>, AxumPath(session_id): AxumPath<String>) -> Response {
    match state.orchestrator.pause_session(&SessionId::new(session_id)) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => orchestrator_error_response(&err),
    }
}

async fn resume_session(State(state): State<Arc<AppState>>, AxumPath(session_id): AxumPath<String>) -> Response {
    match state.orchestrator.resume_session(&SessionId::new(session_id)) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => orchestrator_error_response(&err),
    }
}

/// Request body for `POST /sessions/{id}/abort`.
#[derive(Debug, Deserialize)]
struct AbortRequest {
    reason: String,
}

async fn abort_session(State(state): State<Arc<AppState>>, AxumPath(session_id): AxumPath<String>, Json(request): Json<AbortRequest>) -> Response {
    match state.orchestrator.abort_session(&SessionId::new(session_id), request.reason) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => orchestrator_error_response(&err),
    }
}

/// Request body for `POST /sessions/{id}/emergency-stop`.
#[derive(Debug, Deserialize)]
struct EmergencyStopRequest {
    reason: String,
    actor: String,
}

async fn emergency_stop(State(state): State<Arc<AppState>>, AxumPath(session_id): AxumPath<String>, Json(request): Json<EmergencyStopRequest>) -> Response {
    match state.orchestrator.emergency_stop(&SessionId::new(session_id), request.reason, request.actor) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => orchestrator_error_response(&err),
    }
}

fn snapshot_to_json(snapshot: &SessionSnapshot) -> Value {
    json!({
        "session_id": snapshot.id.as_str(),
        "status": snapshot.status,
        "per_story_gate": snapshot.per_story_gate,
        "budget": snapshot.budget,
    })
}

fn schema_error_message(err: &SchemaError) -> String {
    err.to_string()
}

fn intake_error_message(err: &IntakeError) -> String {
    err.to_string()
}

/// Maps an [`OrchestratorError`] to an HTTP status: unknown sessions and bad
/// requests are client errors (`404`/`400`); everything else is a server
/// error (`500`), matching §7's taxonomy (transient infra vs. programmer error).
fn orchestrator_error_response(err: &OrchestratorError) -> Response {
    match err {
        OrchestratorError::UnknownSession(_) => error_response(StatusCode::NOT_FOUND, err.to_string()),
        OrchestratorError::UnconfiguredRole { .. } => error_response(StatusCode::BAD_REQUEST, err.to_string()),
        OrchestratorError::Store(_) | OrchestratorError::Bus(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        OrchestratorError::Transition(_) => error_response(StatusCode::CONFLICT, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::Request;
    use async_trait::async_trait;
    use tower::ServiceExt;
    use wave_config::RuntimeConfig;
    use wave_core::Worker;
    use wave_core::WorkerError;
    use wave_core::WorkerExit;
    use wave_core::WorkerTurn;

    use super::*;
    use crate::runtime::Runtime;

    /// A worker that completes its first turn immediately with no writes,
    /// standing in for the out-of-scope external worker (§1) in tests that
    /// only exercise the control surface, not dispatch behavior.
    struct NoopWorker;

    #[async_trait]
    impl Worker for NoopWorker {
        async fn invoke(&self, _story: &wave_core::Story, _role: &str, _context: &Value) -> Result<WorkerTurn, WorkerError> {
            Ok(WorkerTurn { narration: String::new(), proposed_writes: Vec::new(), proposed_commands: Vec::new(), tokens_in: 0, tokens_out: 0, done: true })
        }

        async fn kill(&self) -> WorkerExit {
            WorkerExit::Killed
        }
    }

    fn router() -> Router {
        let runtime = Arc::new(Runtime::in_memory(RuntimeConfig::default(), Arc::new(NoopWorker)));
        let orchestrator = Arc::new(SessionOrchestrator::new(runtime));
        build_router(orchestrator)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
        serde_json::from_slice(&bytes).expect("parse json")
    }

    #[tokio::test]
    async fn health_reports_zero_active_sessions_initially() {
        let response = router().oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_sessions"], 0);
    }

    #[tokio::test]
    async fn get_session_on_unknown_id_is_404() {
        let response = router()
            .oneshot(Request::builder().uri("/sessions/nope").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_session_rejects_story_missing_required_field() {
        let request_body = json!({"project_path": "/tmp/demo", "stories": [{"id": "S-1"}]});
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(request_body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn start_session_rejects_unconfigured_role() {
        let story = json!({
            "id": "AUTH-1",
            "title": "Login",
            "domain": "AUTH",
            "role": "backend-1",
            "wave": 1,
            "objective": {"as_a": "user", "i_want": "to log in", "so_that": "I can access my account"},
            "acceptance_criteria": ["a", "b", "c"],
            "files": {"create": [], "modify": [], "forbidden": []},
            "safety": {"stop_conditions": ["a", "b", "c"]},
            "thresholds": {"max_tokens": 1000, "max_cost": 1.0, "max_duration_minutes": 10}
        });
        let request_body = json!({"project_path": "/tmp/demo", "stories": [story]});
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(request_body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn start_session_then_get_session_round_trips() {
        let runtime_config = RuntimeConfig {
            models: [("backend-1".to_string(), "gpt-x".to_string())].into_iter().collect(),
            rates: [("gpt-x".to_string(), wave_core::ModelRate { input_micros_per_1k: 1, output_micros_per_1k: 1 })].into_iter().collect(),
            ..RuntimeConfig::default()
        };
        let runtime = Arc::new(Runtime::in_memory(runtime_config, Arc::new(NoopWorker)));
        let orchestrator = Arc::new(SessionOrchestrator::new(runtime));
        let app = build_router(orchestrator);

        let story = json!({
            "id": "AUTH-1",
            "title": "Login",
            "domain": "AUTH",
            "role": "backend-1",
            "wave": 1,
            "objective": {"as_a": "user", "i_want": "to log in", "so_that": "I can access my account"},
            "acceptance_criteria": ["a", "b", "c"],
            "files": {"create": [], "modify": [], "forbidden": []},
            "safety": {"stop_conditions": ["a", "b", "c"]},
            "thresholds": {"max_tokens": 1000, "max_cost": 1.0, "max_duration_minutes": 10}
        });
        let request_body = json!({"project_path": "/tmp/demo", "stories": [story]});
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(request_body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let session_id = body["session_id"].as_str().expect("session_id").to_string();

        let response = app
            .oneshot(Request::builder().uri(format!("/sessions/{session_id}")).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["session_id"], session_id);
    }
}
