//! Streamable HTTP client transport.
//!
//! Implements the session-machine [`Transport`] over HTTP: each outbound
//! message is a POST whose response may be an immediate JSON body, an SSE
//! stream drained into the inbound queue, or an empty `202`. One hanging GET
//! carries server-initiated traffic (stream 0) and reconnects with
//! `Last-Event-ID` under exponential backoff.
//!
//! POSTs are retried on `408`, `425`, `429`, `500`, `502`, `503`, `504` and
//! network timeouts, never after local cancellation, and at most
//! [`StreamableClientConfig::max_retries`] times. Backoff starts at
//! [`StreamableClientConfig::initial_backoff`], doubles per attempt, carries
//! up to 50% jitter, and is capped at 30 seconds; the hanging GET resets its
//! attempt counter on every successful connection.

use async_trait::async_trait;
use duplexmcp_protocol::jsonrpc::JsonRpcMessage;
use duplexmcp_session::transport::{Connection, Outbound, Transport};
use duplexmcp_session::{SessionError, SessionResult};
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::headers;
use crate::sse::SseParser;

/// Cap on a single backoff sleep.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Streamable HTTP client configuration.
#[derive(Clone)]
pub struct StreamableClientConfig {
    /// The MCP endpoint URL.
    pub url: String,
    /// Maximum retry attempts for a failed POST or dropped GET; `0` disables
    /// retrying.
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt.
    pub initial_backoff: Duration,
    /// HTTP client to use; a default client when unset.
    pub http: Option<reqwest::Client>,
}

impl StreamableClientConfig {
    /// Configuration for the given endpoint URL with default retry policy.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_retries: 0,
            initial_backoff: Duration::from_secs(1),
            http: None,
        }
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial backoff delay.
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }
}

/// Streamable HTTP client transport.
pub struct StreamableClientTransport {
    config: StreamableClientConfig,
}

impl StreamableClientTransport {
    /// Create a transport for the given configuration.
    pub fn new(config: StreamableClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transport for StreamableClientTransport {
    async fn connect(self: Box<Self>) -> SessionResult<Box<dyn Connection>> {
        let http = self
            .config
            .http
            .clone()
            .unwrap_or_else(reqwest::Client::new);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (session_id_tx, session_id_rx) = watch::channel(None);

        let shared = Arc::new(ClientShared {
            http,
            config: self.config,
            session_id: session_id_tx,
            inbound_tx,
            closed: CancellationToken::new(),
        });

        tokio::spawn(listen_loop(shared.clone(), session_id_rx));

        Ok(Box::new(StreamableClientConnection {
            shared,
            inbound: tokio::sync::Mutex::new(inbound_rx),
        }))
    }
}

struct ClientShared {
    http: reqwest::Client,
    config: StreamableClientConfig,
    session_id: watch::Sender<Option<String>>,
    inbound_tx: mpsc::Sender<JsonRpcMessage>,
    closed: CancellationToken,
}

impl ClientShared {
    fn current_session_id(&self) -> Option<String> {
        self.session_id.borrow().clone()
    }

    /// Record the server-issued session ID; it never rotates afterwards.
    fn observe_session_id(&self, headers: &HeaderMap) {
        if self.current_session_id().is_some() {
            return;
        }
        if let Some(id) = headers
            .get(headers::MCP_SESSION_ID)
            .and_then(|v| v.to_str().ok())
        {
            debug!(session_id = id, "session established");
            let _ = self.session_id.send(Some(id.to_string()));
        }
    }

    async fn deliver(&self, message: JsonRpcMessage) -> bool {
        match message {
            JsonRpcMessage::Batch(items) => {
                for item in items {
                    if self.inbound_tx.send(item).await.is_err() {
                        return false;
                    }
                }
                true
            }
            message => self.inbound_tx.send(message).await.is_ok(),
        }
    }
}

struct StreamableClientConnection {
    shared: Arc<ClientShared>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<JsonRpcMessage>>,
}

#[async_trait]
impl Connection for StreamableClientConnection {
    async fn read(&self) -> SessionResult<Option<JsonRpcMessage>> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.shared.closed.cancelled() => Ok(None),
            message = inbound.recv() => Ok(message),
        }
    }

    async fn write(&self, outbound: Outbound) -> SessionResult<()> {
        let body = duplexmcp_protocol::encode(&outbound.message)?;
        let mut attempt: u32 = 0;
        loop {
            if self.shared.closed.is_cancelled() {
                return Err(SessionError::ConnectionClosed);
            }
            match post_once(&self.shared, body.clone()).await {
                Ok(()) => return Ok(()),
                Err(PostError::Fatal(err)) => return Err(err),
                Err(PostError::Retryable(reason)) => {
                    if attempt >= self.shared.config.max_retries {
                        return Err(SessionError::Transport(format!(
                            "POST failed after {attempt} retries: {reason}"
                        )));
                    }
                    let delay = backoff_delay(self.shared.config.initial_backoff, attempt);
                    debug!(attempt, ?delay, reason, "retrying POST");
                    tokio::select! {
                        _ = self.shared.closed.cancelled() => {
                            return Err(SessionError::ConnectionClosed);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn close(&self) -> SessionResult<()> {
        if self.shared.closed.is_cancelled() {
            return Ok(());
        }
        self.shared.closed.cancel();
        self.inbound.lock().await.close();

        // Best-effort DELETE to free server-side session state.
        if let Some(session_id) = self.shared.current_session_id() {
            let request = self
                .shared
                .http
                .delete(&self.shared.config.url)
                .header(headers::MCP_SESSION_ID, session_id)
                .timeout(Duration::from_secs(5));
            if let Err(err) = request.send().await {
                debug!(error = %err, "session DELETE failed");
            }
        }
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.shared.current_session_id()
    }
}

enum PostError {
    /// Worth retrying within the configured budget.
    Retryable(String),
    /// Not retryable; surface to the caller.
    Fatal(SessionError),
}

/// Whether an HTTP status is worth retrying.
fn retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

/// Exponential backoff with up to 50% jitter, capped at 30 seconds.
fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    let base = initial
        .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
        .unwrap_or(BACKOFF_CAP)
        .min(BACKOFF_CAP);
    let jitter = base.mul_f64(fastrand::f64() * 0.5);
    (base + jitter).min(BACKOFF_CAP)
}

async fn post_once(shared: &Arc<ClientShared>, body: Vec<u8>) -> Result<(), PostError> {
    let mut request = shared
        .http
        .post(&shared.config.url)
        .header(ACCEPT, "application/json, text/event-stream")
        .header(CONTENT_TYPE, headers::CONTENT_TYPE_JSON)
        .body(body);
    if let Some(session_id) = shared.current_session_id() {
        request = request.header(headers::MCP_SESSION_ID, session_id);
    }

    let response = request.send().await.map_err(|err| {
        if err.is_timeout() || err.is_connect() {
            PostError::Retryable(err.to_string())
        } else {
            PostError::Fatal(SessionError::Transport(err.to_string()))
        }
    })?;

    let status = response.status();
    shared.observe_session_id(response.headers());

    if status == StatusCode::NOT_FOUND {
        return Err(PostError::Fatal(SessionError::SessionMissing));
    }
    if retryable_status(status) {
        return Err(PostError::Retryable(format!("status {status}")));
    }
    if !status.is_success() {
        return Err(PostError::Fatal(SessionError::Transport(format!(
            "POST failed: {status}"
        ))));
    }
    if status == StatusCode::ACCEPTED {
        return Ok(());
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.contains(headers::CONTENT_TYPE_SSE) {
        // Drain the response stream in the background; the reader must not
        // wait on this POST's handler traffic.
        let shared = shared.clone();
        tokio::spawn(async move {
            read_sse_body(&shared, response, None).await;
        });
        return Ok(());
    }

    // Immediate JSON response (single message or batch).
    let bytes = response
        .bytes()
        .await
        .map_err(|err| PostError::Retryable(err.to_string()))?;
    if bytes.is_empty() {
        return Ok(());
    }
    match duplexmcp_protocol::decode(&bytes) {
        Ok(message) => {
            if !shared.deliver(message).await {
                return Err(PostError::Fatal(SessionError::ConnectionClosed));
            }
            Ok(())
        }
        Err(err) => Err(PostError::Fatal(SessionError::Protocol(err))),
    }
}

/// Drain one SSE body into the inbound queue.
///
/// When `last_event_id` is supplied, each event's ID is recorded there for
/// reconnection.
async fn read_sse_body(
    shared: &Arc<ClientShared>,
    response: reqwest::Response,
    mut last_event_id: Option<&mut Option<String>>,
) {
    let mut parser = SseParser::new();
    let mut stream = response.bytes_stream();
    loop {
        let chunk = tokio::select! {
            _ = shared.closed.cancelled() => return,
            chunk = stream.next() => chunk,
        };
        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => {
                debug!(error = %err, "SSE stream error");
                return;
            }
            None => return,
        };
        for event in parser.feed(&chunk) {
            if let (Some(tracker), Some(id)) = (last_event_id.as_deref_mut(), &event.id) {
                *tracker = Some(id.clone());
            }
            if event.data.trim().is_empty() {
                continue;
            }
            match duplexmcp_protocol::decode(event.data.as_bytes()) {
                Ok(message) => {
                    if !shared.deliver(message).await {
                        return;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "dropping undecodable SSE event");
                }
            }
        }
    }
}

/// The hanging GET: one long-lived stream-0 connection, reconnected with
/// `Last-Event-ID` and exponential backoff.
async fn listen_loop(shared: Arc<ClientShared>, mut session_id: watch::Receiver<Option<String>>) {
    // Server push is only addressable once the first POST established the
    // session.
    let established = tokio::select! {
        _ = shared.closed.cancelled() => return,
        result = session_id.wait_for(Option::is_some) => result.is_ok(),
    };
    if !established {
        return;
    }

    let mut last_event_id: Option<String> = None;
    let mut attempt: u32 = 0;
    loop {
        if shared.closed.is_cancelled() {
            return;
        }
        let Some(current) = shared.current_session_id() else {
            return;
        };

        let mut request = shared
            .http
            .get(&shared.config.url)
            .header(ACCEPT, headers::CONTENT_TYPE_SSE)
            .header(headers::MCP_SESSION_ID, current);
        if let Some(last) = &last_event_id
            && let Ok(value) = HeaderValue::from_str(last)
        {
            request = request.header(headers::LAST_EVENT_ID, value);
        }

        let outcome = tokio::select! {
            _ = shared.closed.cancelled() => return,
            outcome = request.send() => outcome,
        };
        match outcome {
            Ok(response) if response.status().is_success() => {
                attempt = 0;
                read_sse_body(&shared, response, Some(&mut last_event_id)).await;
                debug!("server push stream ended, reconnecting");
            }
            Ok(response) if response.status() == StatusCode::GONE => {
                debug!("session terminated by server, stopping listener");
                return;
            }
            Ok(response) if response.status() == StatusCode::METHOD_NOT_ALLOWED => {
                debug!("server does not offer a push stream");
                return;
            }
            Ok(response) => {
                debug!(status = %response.status(), "server push connection rejected");
            }
            Err(err) => {
                debug!(error = %err, "server push connection failed");
            }
        }

        if attempt >= shared.config.max_retries {
            debug!(attempt, "listener retry budget exhausted");
            return;
        }
        let delay = backoff_delay(shared.config.initial_backoff, attempt);
        tokio::select! {
            _ = shared.closed.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        for code in [408u16, 425, 429, 500, 502, 503, 504] {
            assert!(retryable_status(StatusCode::from_u16(code).unwrap()), "{code}");
        }
        for code in [200u16, 202, 204, 400, 401, 403, 404, 405, 410, 413] {
            assert!(!retryable_status(StatusCode::from_u16(code).unwrap()), "{code}");
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let initial = Duration::from_secs(1);
        for attempt in 0..10 {
            let delay = backoff_delay(initial, attempt);
            let base = Duration::from_secs(1 << attempt.min(5)).min(BACKOFF_CAP);
            assert!(delay >= base.min(BACKOFF_CAP), "attempt {attempt}: {delay:?}");
            assert!(delay <= BACKOFF_CAP, "attempt {attempt}: {delay:?}");
        }
        // Far past the cap, the delay stays pinned at the cap.
        assert_eq!(backoff_delay(initial, 63), BACKOFF_CAP);
    }

    #[test]
    fn test_backoff_jitter_stays_within_half() {
        let initial = Duration::from_millis(100);
        for _ in 0..100 {
            let delay = backoff_delay(initial, 0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }
}
