//! SSE-then-POST transport for one remote tool invocation
//!
//! The session walks a fixed sequence of states:
//!
//! ```text
//! AwaitingEndpoint -> SessionEstablished -> AwaitingPayload -> Done
//!         \                  \                    \
//!          +------------------+--------------------+-> Failed
//! ```
//!
//! The POST is only issued from `SessionEstablished`, i.e. after the SSE
//! stream announced the endpoint carrying the session id. The SSE body is
//! decoded into events by a background task that is aborted and joined on
//! every exit.

use crate::error::{Error, Result};
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Path prefix of the endpoint announced on the SSE stream
const ENDPOINT_PREFIX: &str = "/messages";

/// Event name closing a stream without a result
const DONE_EVENT: &str = "done";

/// Header carrying the session id on the POST leg
pub const SESSION_HEADER: &str = "MCP-Session-Id";

/// Buffered SSE events between the reader task and the session
const EVENT_BUFFER: usize = 64;

/// Upper bound for deadlines that would overflow the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A named remote tool call with its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    /// Tool name, e.g. `resolve-library-id`
    pub tool_name: String,
    /// Tool arguments
    pub parameters: Map<String, Value>,
}

impl ToolRequest {
    /// Build a request from a tool name and a JSON object of arguments.
    /// Non-object argument values are ignored.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, parameters: Value) -> Self {
        let parameters = match parameters {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            tool_name: tool_name.into(),
            parameters,
        }
    }

    /// Query string of the SSE leg: `tool=<name>&<params...>`
    #[must_use]
    pub fn sse_query(&self) -> String {
        let mut pairs = vec![format!("tool={}", urlencoding::encode(&self.tool_name))];
        for (key, value) in &self.parameters {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            pairs.push(format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&value)
            ));
        }
        pairs.join("&")
    }

    /// JSON-RPC body of the POST leg
    #[must_use]
    pub fn rpc_body(&self) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": {
                "name": self.tool_name,
                "arguments": self.parameters,
            },
            "id": 1,
        })
    }
}

/// Endpoint announced by the server for one open SSE stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Path and query to POST to, e.g. `/messages?sessionId=abc`
    pub endpoint_path: String,
    /// Session id extracted from the endpoint query
    pub session_id: String,
}

impl SessionHandle {
    /// Parse an endpoint announcement (`data: /messages?sessionId=...`).
    ///
    /// Only the event data is inspected; the announcement is recognised by
    /// its path prefix whatever the event name.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        let endpoint_path = event.data.trim();
        if !endpoint_path.starts_with(ENDPOINT_PREFIX) {
            return None;
        }
        let session_id = endpoint_path
            .split_once('?')
            .and_then(|(_, query)| {
                query
                    .split('&')
                    .find_map(|pair| pair.strip_prefix("sessionId="))
            })
            .unwrap_or_default()
            .to_string();
        Some(Self {
            endpoint_path: endpoint_path.to_string(),
            session_id,
        })
    }
}

/// Connection settings shared by every session of one client
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Service base URL without trailing slash
    pub base_url: String,
    /// Bearer token, if any
    pub api_key: Option<String>,
    /// Bound on waiting for the endpoint announcement
    pub endpoint_timeout: Duration,
    /// Bound on the POST and on waiting for the result payload
    pub response_timeout: Duration,
}

#[derive(Debug)]
enum SessionState {
    AwaitingEndpoint,
    SessionEstablished(SessionHandle),
    AwaitingPayload,
    Done(Option<Value>),
    Failed(Error),
}

type EventReceiver = mpsc::Receiver<Result<Event>>;

/// Execute one tool invocation and return the first JSON payload, if any.
///
/// `Ok(None)` means the exchange completed without a usable payload
/// (stream closed early, `event: done`, or a non-202 POST acceptance).
pub async fn invoke(http: &Client, config: &SessionConfig, request: &ToolRequest) -> Result<Option<Value>> {
    let sse_url = format!("{}/sse?{}", config.base_url, request.sse_query());
    tracing::debug!(tool = %request.tool_name, "opening SSE stream");

    let mut get = http.get(&sse_url).header(ACCEPT, "text/event-stream");
    if let Some(key) = &config.api_key {
        get = get.header(AUTHORIZATION, format!("Bearer {key}"));
    }

    let response = tokio::time::timeout(config.endpoint_timeout, get.send())
        .await
        .map_err(|_| Error::Timeout("opening SSE stream".to_string()))?
        .map_err(Error::from_transport)?;
    check_status(response.status())?;

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let reader = tokio::spawn(forward_events(response.bytes_stream(), tx));

    let outcome = drive(http, config, request, rx).await;

    reader.abort();
    join_reader(reader).await;

    outcome
}

async fn drive(http: &Client, config: &SessionConfig, request: &ToolRequest, mut rx: EventReceiver) -> Result<Option<Value>> {
    let mut state = SessionState::AwaitingEndpoint;

    loop {
        tracing::trace!(?state, tool = %request.tool_name, "session state");
        state = match state {
            SessionState::AwaitingEndpoint => {
                let deadline = deadline_after(config.endpoint_timeout);
                match await_endpoint(&mut rx, deadline).await {
                    Ok(Some(handle)) => SessionState::SessionEstablished(handle),
                    Ok(None) => {
                        tracing::debug!("SSE stream closed before announcing an endpoint");
                        SessionState::Done(None)
                    }
                    Err(e) => SessionState::Failed(e),
                }
            }
            SessionState::SessionEstablished(handle) => {
                match post_request(http, config, request, &handle).await {
                    Ok(StatusCode::ACCEPTED) => SessionState::AwaitingPayload,
                    Ok(status) => {
                        tracing::debug!(%status, "tool call was not accepted for streaming");
                        SessionState::Done(None)
                    }
                    Err(e) => SessionState::Failed(e),
                }
            }
            SessionState::AwaitingPayload => {
                let deadline = deadline_after(config.response_timeout);
                match await_payload(&mut rx, deadline).await {
                    Ok(payload) => SessionState::Done(payload),
                    Err(e) => SessionState::Failed(e),
                }
            }
            SessionState::Done(payload) => return Ok(payload),
            SessionState::Failed(e) => return Err(e),
        };
    }
}

async fn await_endpoint(rx: &mut EventReceiver, deadline: Instant) -> Result<Option<SessionHandle>> {
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Err(_) => return Err(Error::Timeout("waiting for SSE endpoint".to_string())),
            Ok(None) => return Ok(None),
            Ok(Some(Err(e))) => return Err(e),
            Ok(Some(Ok(event))) => {
                if let Some(handle) = SessionHandle::from_event(&event) {
                    tracing::debug!(session_id = %handle.session_id, "session established");
                    return Ok(Some(handle));
                }
            }
        }
    }
}

async fn post_request(
    http: &Client,
    config: &SessionConfig,
    request: &ToolRequest,
    handle: &SessionHandle,
) -> Result<StatusCode> {
    let url = format!("{}{}", config.base_url, handle.endpoint_path);

    let mut post = http.post(&url).json(&request.rpc_body());
    if !handle.session_id.is_empty() {
        post = post.header(SESSION_HEADER, &handle.session_id);
    }
    if let Some(key) = &config.api_key {
        post = post.header(AUTHORIZATION, format!("Bearer {key}"));
    }

    let response = tokio::time::timeout(config.response_timeout, post.send())
        .await
        .map_err(|_| Error::Timeout("posting tool call".to_string()))?
        .map_err(Error::from_transport)?;

    let status = response.status();
    check_status(status)?;
    Ok(status)
}

async fn await_payload(rx: &mut EventReceiver, deadline: Instant) -> Result<Option<Value>> {
    loop {
        let event = match tokio::time::timeout_at(deadline, rx.recv()).await {
            Err(_) => return Err(Error::Timeout("waiting for tool result".to_string())),
            Ok(None) => return Ok(None),
            Ok(Some(event)) => event?,
        };

        if event.event == DONE_EVENT {
            return Ok(None);
        }

        let data = event.data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        match serde_json::from_str::<Value>(data) {
            Ok(payload) => return Ok(Some(payload)),
            Err(e) => tracing::debug!("Failed to parse JSON response: {e}"),
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

fn check_status(status: StatusCode) -> Result<()> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Auth("Invalid API key".to_string()));
    }
    if !status.is_success() {
        return Err(Error::HttpStatus {
            status: status.as_u16(),
        });
    }
    Ok(())
}

/// Decode the SSE body into events and forward them until the stream ends,
/// fails, or the session stops listening.
async fn forward_events<S, B>(body: S, tx: mpsc::Sender<Result<Event>>)
where
    S: Stream<Item = std::result::Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    let mut events = std::pin::pin!(body.eventsource());

    while let Some(event) = events.next().await {
        let event = event.map_err(decode_error);
        let failed = event.is_err();
        if tx.send(event).await.is_err() || failed {
            return;
        }
    }
}

fn decode_error(err: EventStreamError<reqwest::Error>) -> Error {
    match err {
        EventStreamError::Transport(e) => Error::from_transport(e),
        other => Error::Parse(format!("malformed SSE stream: {other}")),
    }
}

async fn join_reader(reader: JoinHandle<()>) {
    if let Err(e) = reader.await {
        if !e.is_cancelled() {
            tracing::warn!("SSE reader task failed: {e}");
        }
    }
}
