//! In-process HTTP mock server.
//!
//! Adapter tests spawn a [`ScriptedApi`] (or any axum `Router`) on an ephemeral port
//! and point the client under test at [`MockServer::base_url`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tokio::task::JoinHandle;
use url::form_urlencoded;

pub struct MockServer {
    base_url: String,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Serve `router` on `127.0.0.1:0`. Panics if the listener cannot bind.
    pub async fn spawn(router: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("mock server error");
        });
        Self {
            base_url: format!("http://{addr}"),
            handle,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// One request captured by [`ScriptedApi`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Raw (still percent-encoded) path.
    pub path: String,
    pub query: Option<String>,
    /// Body parsed as JSON, or `Value::Null` for non-JSON bodies.
    pub body: Value,
    pub raw_body: String,
}

impl RecordedRequest {
    /// Decoded values of query parameter `name`, in order.
    pub fn query_values(&self, name: &str) -> Vec<String> {
        let query = self.query.as_deref().unwrap_or("");
        form_urlencoded::parse(query.as_bytes())
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .collect()
    }
}

/// Mock upstream that answers every request with the next scripted response
/// (status + JSON body) and records what it received.
///
/// When the script runs out it answers `500 {"error":"unscripted"}`.
#[derive(Clone, Default)]
pub struct ScriptedApi {
    responses: Arc<Mutex<VecDeque<(u16, Value)>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status: u16, body: Value) -> &Self {
        self.responses.lock().unwrap().push_back((status, body));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .fallback(scripted_handler)
            .with_state(self.clone())
    }

    pub async fn spawn(&self) -> MockServer {
        MockServer::spawn(self.router()).await
    }
}

async fn scripted_handler(
    State(api): State<ScriptedApi>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let raw_body = String::from_utf8_lossy(&body).into_owned();
    api.requests.lock().unwrap().push(RecordedRequest {
        method,
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        raw_body,
    });
    let (status, body) = api
        .responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((500, serde_json::json!({ "error": "unscripted" })));
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(body)).into_response()
}
