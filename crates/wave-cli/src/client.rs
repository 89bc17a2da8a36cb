// crates/wave-cli/src/client.rs
// ============================================================================
// Module: Control Surface Client
// Description: A minimal JSON-over-HTTP client against `wave serve`'s
//              control surface (§6).
// Purpose: Give every thin-client subcommand (`health`, `start-session`,
//          `get-session`, `pause-session`, `resume-session`,
//          `abort-session`, `emergency-stop`) one place to send a request
//          and get back a parsed JSON body or a typed error.
// Dependencies: hyper, hyper-util, http-body-util, bytes, serde_json
// ============================================================================

use bytes::Bytes;
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::Method;
use hyper::Request;
use hyper::StatusCode;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;

/// Error talking to a `wave serve` control surface.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request could not be sent (connection refused, DNS failure, malformed URL).
    #[error("request to wave serve failed: {0}")]
    Transport(String),
    /// The server responded with a non-2xx status; carries the status and parsed body.
    #[error("wave serve returned {status}: {body}")]
    Status {
        /// The HTTP status code returned.
        status: StatusCode,
        /// The response body (JSON error message, or raw text if not JSON).
        body: String,
    },
    /// The response body was not valid JSON.
    #[error("wave serve returned a non-JSON response: {0}")]
    MalformedResponse(String),
}

/// A thin client over one `wave serve` base URL (e.g. `http://127.0.0.1:7878`).
pub struct ControlClient {
    base_url: String,
    http: Client<HttpConnector, Full<Bytes>>,
}

impl ControlClient {
    /// Builds a client against `base_url`, with no trailing slash assumed
    /// (it is stripped if present).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.strip_suffix('/').map(str::to_string).unwrap_or(base_url);
        Self { base_url, http: Client::builder(TokioExecutor::new()).build_http() }
    }

    /// Sends a `GET` request to `path` and parses the response body as JSON.
    ///
    /// # Errors
    /// Returns [`ClientError`] on transport failure, a non-2xx status, or a
    /// non-JSON response body.
    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("{}{path}", self.base_url))
            .body(Full::new(Bytes::new()))
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        self.send(request).await
    }

    /// Sends a `POST` request with a JSON body to `path` and parses the
    /// response body as JSON.
    ///
    /// # Errors
    /// Returns [`ClientError`] on transport failure, a non-2xx status, or a
    /// non-JSON response body.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        let encoded = serde_json::to_vec(body).map_err(|err| ClientError::MalformedResponse(err.to_string()))?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{}{path}", self.base_url))
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(encoded)))
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        self.send(request).await
    }

    async fn send(&self, request: Request<Full<Bytes>>) -> Result<Value, ClientError> {
        let response = self.http.request(request).await.map_err(|err| ClientError::Transport(err.to_string()))?;
        let status = response.status();
        let collected = response.into_body().collect().await.map_err(|err| ClientError::Transport(err.to_string()))?;
        let bytes = collected.to_bytes();
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).to_string();
            return Err(ClientError::Status { status, body: text });
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|err| ClientError::MalformedResponse(err.to_string()))
    }
}
