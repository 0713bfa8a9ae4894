//! Streamable HTTP server transport.
//!
//! A [`StreamableServer`] exposes one URL speaking GET, POST, and DELETE and
//! multiplexes stateful MCP sessions over it. Each logical session runs one
//! `duplexmcp-session` server session whose connection is fed by POST bodies
//! and drained into per-stream SSE buffers:
//!
//! - stream 0 is the dedicated server-push channel (the GET stream);
//! - stream N (N >= 1) answers the N-th request-carrying POST.
//!
//! Outgoing messages are routed by origin: responses to the stream that
//! carried their request, handler-context messages to that handler's stream,
//! everything else to stream 0. A message aimed at a stream whose requests
//! are all answered is rerouted to stream 0 rather than dropped.
//!
//! Buffers are retained for the session lifetime; `Last-Event-ID`
//! reconnection replays any suffix of any stream. At most one HTTP response
//! writes a given stream at a time, enforced by ownership of the stream's
//! 1-buffered wake signal.

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use duplexmcp_protocol::jsonrpc::{JsonRpcMessage, RequestId};
use duplexmcp_session::transport::{Connection, Outbound, Transport};
use duplexmcp_session::{Server, ServerSession, SessionError, SessionResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::{format_event_id, parse_event_id};
use crate::{effective_body_limit, headers};

/// Streamable HTTP server configuration.
#[derive(Clone, Debug)]
pub struct StreamableServerConfig {
    /// Request body limit: `0` for the default (1,000,000 bytes), negative
    /// for unlimited, positive for that many bytes. Oversized bodies get
    /// `413` and the connection is closed.
    pub max_body_bytes: i64,
    /// Answer request-carrying POSTs with a plain `application/json` body
    /// instead of an SSE stream. Handler-context messages then travel on
    /// stream 0.
    pub json_response: bool,
}

impl Default for StreamableServerConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 0,
            json_response: false,
        }
    }
}

/// Per-stream delivery state.
struct StreamState {
    /// Ordered event payloads; the vector index is the SSE event index.
    events: Vec<String>,
    /// Incoming request IDs this stream still owes responses for.
    requests: HashSet<RequestId>,
    /// Wake signal for the HTTP response writer holding this stream.
    signal_tx: mpsc::Sender<()>,
    /// Held here when no HTTP response owns the stream; taking it is how a
    /// writer acquires exclusive ownership.
    signal_rx: Option<mpsc::Receiver<()>>,
    /// Set when every request on a non-zero stream has been answered.
    done: bool,
}

impl StreamState {
    fn new() -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(1);
        Self {
            events: Vec::new(),
            requests: HashSet::new(),
            signal_tx,
            signal_rx: Some(signal_rx),
            done: false,
        }
    }
}

struct HttpSessionState {
    next_stream_id: u64,
    streams: HashMap<u64, StreamState>,
    /// Which stream each outstanding incoming request belongs to.
    request_streams: HashMap<RequestId, u64>,
}

struct SessionShared {
    state: Mutex<HttpSessionState>,
    closed: CancellationToken,
    json_response: bool,
}

impl SessionShared {
    fn wake_all(&self) {
        let state = self.state.lock();
        for stream in state.streams.values() {
            let _ = stream.signal_tx.try_send(());
        }
    }
}

/// The session-machine side of one logical HTTP session.
struct HttpServerConnection {
    session_id: String,
    inbound: tokio::sync::Mutex<mpsc::Receiver<JsonRpcMessage>>,
    shared: Arc<SessionShared>,
}

#[async_trait]
impl Connection for HttpServerConnection {
    async fn read(&self) -> SessionResult<Option<JsonRpcMessage>> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.shared.closed.cancelled() => Ok(None),
            message = inbound.recv() => Ok(message),
        }
    }

    async fn write(&self, outbound: Outbound) -> SessionResult<()> {
        if self.shared.closed.is_cancelled() {
            return Err(SessionError::ConnectionClosed);
        }
        let payload = serde_json::to_string(&outbound.message)
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let response_id = match &outbound.message {
            JsonRpcMessage::Response(response) => response.id.as_request_id().cloned(),
            _ => None,
        };

        let mut state = self.shared.state.lock();
        let target = if let Some(id) = &response_id {
            match state.request_streams.get(id) {
                Some(stream_id) => *stream_id,
                None => {
                    warn!(id = %id, "response for unknown request, rerouting to general stream");
                    0
                }
            }
        } else if let Some(origin) = &outbound.origin {
            if self.shared.json_response {
                // JSON-mode POST responses cannot interleave other
                // messages, so handler traffic goes out on the GET stream.
                0
            } else {
                match state.request_streams.get(origin) {
                    Some(stream_id) => *stream_id,
                    None => {
                        warn!(
                            origin = %origin,
                            "message for an already-answered stream, rerouting to general stream"
                        );
                        0
                    }
                }
            }
        } else {
            0
        };

        let Some(stream) = state.streams.get_mut(&target) else {
            return Err(SessionError::Transport(format!(
                "stream {target} missing from session state"
            )));
        };
        stream.events.push(payload);
        let _ = stream.signal_tx.try_send(());

        if let Some(id) = response_id {
            stream.requests.remove(&id);
            if target != 0 && stream.requests.is_empty() {
                stream.done = true;
            }
            state.request_streams.remove(&id);
        }
        Ok(())
    }

    async fn close(&self) -> SessionResult<()> {
        self.shared.closed.cancel();
        self.shared.wake_all();
        self.inbound.lock().await.close();
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        Some(self.session_id.clone())
    }
}

/// Transport adapter handing a pre-built connection to `Server::connect`.
struct PreparedTransport(Option<HttpServerConnection>);

#[async_trait]
impl Transport for PreparedTransport {
    async fn connect(mut self: Box<Self>) -> SessionResult<Box<dyn Connection>> {
        self.0
            .take()
            .map(|conn| Box::new(conn) as Box<dyn Connection>)
            .ok_or(SessionError::ConnectionClosed)
    }
}

struct HttpSession {
    id: String,
    shared: Arc<SessionShared>,
    inbound_tx: mpsc::Sender<JsonRpcMessage>,
    session: ServerSession,
}

struct StreamableState {
    server: Server,
    config: StreamableServerConfig,
    sessions: Mutex<HashMap<String, Arc<HttpSession>>>,
    /// IDs of sessions that existed and were terminated; GETs for these get
    /// `410 Gone` instead of `404`.
    ended: Mutex<HashSet<String>>,
}

/// The streamable HTTP facade over a [`Server`].
#[derive(Clone)]
pub struct StreamableServer {
    state: Arc<StreamableState>,
}

impl StreamableServer {
    /// Wrap a server in the streamable HTTP transport.
    pub fn new(server: Server, config: StreamableServerConfig) -> Self {
        Self {
            state: Arc::new(StreamableState {
                server,
                config,
                sessions: Mutex::new(HashMap::new()),
                ended: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Build the axum router serving the transport at `path`.
    pub fn router(&self, path: &str) -> Router {
        Router::new()
            .route(path, any(handle))
            .with_state(self.state.clone())
    }

    /// Terminate every live session.
    pub async fn close(&self) {
        let sessions: Vec<Arc<HttpSession>> = self.state.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in sessions {
            self.state.ended.lock().insert(session.id.clone());
            let _ = session.session.close().await;
        }
    }

    /// The number of live sessions.
    pub fn session_count(&self) -> usize {
        self.state.sessions.lock().len()
    }
}

async fn handle(State(state): State<Arc<StreamableState>>, request: axum::extract::Request) -> Response {
    let method = request.method().clone();
    if method == Method::POST {
        handle_post(state, request).await
    } else if method == Method::GET {
        handle_get(state, request).await
    } else if method == Method::DELETE {
        handle_delete(state, request).await
    } else {
        let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET, POST"));
        response
    }
}

fn text_response(status: StatusCode, body: &str) -> Response {
    (status, body.to_string()).into_response()
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn accepts(headers: &HeaderMap, content_type: &str) -> bool {
    header_str(headers, header::ACCEPT.as_str())
        .is_some_and(|accept| accept.contains(content_type) || accept.contains("*/*"))
}

fn session_header(id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(id) {
        headers.insert(headers::MCP_SESSION_ID, value);
    }
    headers
}

async fn handle_post(state: Arc<StreamableState>, request: axum::extract::Request) -> Response {
    let (parts, body) = request.into_parts();

    if !accepts(&parts.headers, headers::CONTENT_TYPE_JSON)
        || !accepts(&parts.headers, headers::CONTENT_TYPE_SSE)
    {
        return text_response(
            StatusCode::BAD_REQUEST,
            "Accept must include application/json and text/event-stream",
        );
    }

    let limit = effective_body_limit(state.config.max_body_bytes);
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(_) => {
            let mut response =
                text_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
            return response;
        }
    };

    let messages = match duplexmcp_protocol::decode_batch(&bytes) {
        Ok(messages) => messages,
        Err(err) => return text_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    if messages.is_empty() {
        return text_response(StatusCode::BAD_REQUEST, "empty batch");
    }

    let session = match header_str(&parts.headers, headers::MCP_SESSION_ID) {
        Some(id) => match state.sessions.lock().get(id).cloned() {
            Some(session) => session,
            None => return text_response(StatusCode::NOT_FOUND, "session not found"),
        },
        None => match create_session(&state).await {
            Ok(session) => session,
            Err(err) => {
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string());
            }
        },
    };

    let request_ids: Vec<RequestId> = messages
        .iter()
        .filter_map(|m| m.request_id().cloned())
        .collect();

    // No requests: queue everything and acknowledge with an empty 202.
    if request_ids.is_empty() {
        for message in messages {
            if session.inbound_tx.send(message).await.is_err() {
                return text_response(StatusCode::NOT_FOUND, "session closed");
            }
        }
        let headers = session_header(&session.id);
        return (StatusCode::ACCEPTED, headers).into_response();
    }

    // Allocate the response stream and record request-to-stream correlation
    // before any message is dispatched; it cannot be recovered later.
    let stream_id = {
        let mut st = session.shared.state.lock();
        let stream_id = st.next_stream_id;
        st.next_stream_id += 1;
        let mut stream = StreamState::new();
        for id in &request_ids {
            stream.requests.insert(id.clone());
            st.request_streams.insert(id.clone(), stream_id);
        }
        st.streams.insert(stream_id, stream);
        stream_id
    };

    let mut guard = match acquire_writer(&session.shared, stream_id) {
        Some(guard) => guard,
        None => {
            return text_response(
                StatusCode::BAD_REQUEST,
                "stream conflicts with ongoing stream",
            );
        }
    };

    for message in messages {
        if session.inbound_tx.send(message).await.is_err() {
            return text_response(StatusCode::NOT_FOUND, "session closed");
        }
    }

    let response_headers = session_header(&session.id);
    if state.config.json_response {
        json_post_response(session.shared.clone(), stream_id, &mut guard, response_headers).await
    } else {
        sse_response(session.shared.clone(), stream_id, 0, guard, response_headers)
    }
}

async fn handle_get(state: Arc<StreamableState>, request: axum::extract::Request) -> Response {
    let headers_in = request.headers();

    if !accepts(headers_in, headers::CONTENT_TYPE_SSE) {
        return text_response(StatusCode::BAD_REQUEST, "Accept must include text/event-stream");
    }

    let Some(id) = header_str(headers_in, headers::MCP_SESSION_ID) else {
        return text_response(StatusCode::BAD_REQUEST, "missing Mcp-Session-Id header");
    };
    let session = match state.sessions.lock().get(id).cloned() {
        Some(session) => session,
        None => {
            if state.ended.lock().contains(id) {
                return text_response(StatusCode::GONE, "session terminated");
            }
            return text_response(StatusCode::NOT_FOUND, "session not found");
        }
    };

    let (stream_id, start_index) = match header_str(headers_in, headers::LAST_EVENT_ID) {
        Some(last) => match parse_event_id(last) {
            Some((stream_id, index)) => (stream_id, index.saturating_add(1)),
            None => return text_response(StatusCode::BAD_REQUEST, "malformed Last-Event-ID"),
        },
        None => (0, 0),
    };

    let start_index = {
        let st = session.shared.state.lock();
        match st.streams.get(&stream_id) {
            // Resumption is clamped to the events that exist.
            Some(stream) => start_index.min(stream.events.len() as u64),
            None => return text_response(StatusCode::NOT_FOUND, "unknown stream"),
        }
    };

    let Some(guard) = acquire_writer(&session.shared, stream_id) else {
        return text_response(
            StatusCode::BAD_REQUEST,
            "stream conflicts with ongoing stream",
        );
    };

    let response_headers = session_header(&session.id);
    sse_response(
        session.shared.clone(),
        stream_id,
        start_index,
        guard,
        response_headers,
    )
}

async fn handle_delete(state: Arc<StreamableState>, request: axum::extract::Request) -> Response {
    let Some(id) = header_str(request.headers(), headers::MCP_SESSION_ID) else {
        return text_response(StatusCode::BAD_REQUEST, "missing Mcp-Session-Id header");
    };
    let session = state.sessions.lock().remove(id);
    let Some(session) = session else {
        return text_response(StatusCode::NOT_FOUND, "session not found");
    };
    state.ended.lock().insert(session.id.clone());
    let _ = session.session.close().await;
    debug!(session_id = %session.id, "session terminated by DELETE");
    StatusCode::NO_CONTENT.into_response()
}

async fn create_session(state: &Arc<StreamableState>) -> SessionResult<Arc<HttpSession>> {
    let id = uuid::Uuid::new_v4().to_string();
    let (inbound_tx, inbound_rx) = mpsc::channel(256);

    let mut streams = HashMap::new();
    streams.insert(0, StreamState::new());
    let shared = Arc::new(SessionShared {
        state: Mutex::new(HttpSessionState {
            next_stream_id: 1,
            streams,
            request_streams: HashMap::new(),
        }),
        closed: CancellationToken::new(),
        json_response: state.config.json_response,
    });

    let conn = HttpServerConnection {
        session_id: id.clone(),
        inbound: tokio::sync::Mutex::new(inbound_rx),
        shared: shared.clone(),
    };
    let session = state.server.connect(PreparedTransport(Some(conn))).await?;

    let http_session = Arc::new(HttpSession {
        id: id.clone(),
        shared,
        inbound_tx,
        session,
    });
    state.sessions.lock().insert(id.clone(), http_session.clone());

    // Reap transport state when the session machine terminates.
    let reap_state = Arc::clone(state);
    let reap = http_session.clone();
    tokio::spawn(async move {
        let _ = reap.session.wait().await;
        reap_state.sessions.lock().remove(&reap.id);
        reap_state.ended.lock().insert(reap.id.clone());
        reap.shared.closed.cancel();
        reap.shared.wake_all();
    });

    Ok(http_session)
}

/// Exclusive write access to one stream, returned to the session on drop so
/// a disconnected client can resume.
struct WriterGuard {
    shared: Arc<SessionShared>,
    stream_id: u64,
    rx: Option<mpsc::Receiver<()>>,
}

impl WriterGuard {
    async fn wait(&mut self) {
        match &mut self.rx {
            Some(rx) => {
                let _ = rx.recv().await;
            }
            None => std::future::pending().await,
        }
    }
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            let mut state = self.shared.state.lock();
            if let Some(stream) = state.streams.get_mut(&self.stream_id) {
                stream.signal_rx = Some(rx);
            }
        }
    }
}

fn acquire_writer(shared: &Arc<SessionShared>, stream_id: u64) -> Option<WriterGuard> {
    let mut state = shared.state.lock();
    let stream = state.streams.get_mut(&stream_id)?;
    let rx = stream.signal_rx.take()?;
    Some(WriterGuard {
        shared: shared.clone(),
        stream_id,
        rx: Some(rx),
    })
}

/// Stream events from `start_index` onward; for non-zero streams, end once
/// every request is answered and flushed.
fn sse_response(
    shared: Arc<SessionShared>,
    stream_id: u64,
    start_index: u64,
    guard: WriterGuard,
    response_headers: HeaderMap,
) -> Response {
    let stream = async_stream::stream! {
        let mut guard = guard;
        let mut next = start_index;
        loop {
            let (batch, finished) = {
                let state = shared.state.lock();
                match state.streams.get(&stream_id) {
                    Some(stream) => {
                        let start = next as usize;
                        (stream.events.get(start..).unwrap_or_default().to_vec(), stream.done)
                    }
                    None => (Vec::new(), true),
                }
            };
            let flushed = batch.is_empty();
            for data in batch {
                yield Ok::<_, Infallible>(
                    Event::default().id(format_event_id(stream_id, next)).data(data),
                );
                next += 1;
            }
            if finished && flushed {
                break;
            }
            if finished {
                continue;
            }
            tokio::select! {
                _ = shared.closed.cancelled() => break,
                () = guard.wait() => {}
            }
        }
    };

    let mut response = Sse::new(stream).into_response();
    response.headers_mut().extend(response_headers);
    response
}

/// Wait for every response on the stream, then answer with plain JSON.
async fn json_post_response(
    shared: Arc<SessionShared>,
    stream_id: u64,
    guard: &mut WriterGuard,
    response_headers: HeaderMap,
) -> Response {
    loop {
        let (done, events) = {
            let state = shared.state.lock();
            match state.streams.get(&stream_id) {
                Some(stream) => (stream.done, stream.events.clone()),
                None => (true, Vec::new()),
            }
        };
        if done {
            let body = match events.len() {
                1 => events.into_iter().next().unwrap_or_default(),
                _ => format!("[{}]", events.join(",")),
            };
            let mut response = (
                StatusCode::OK,
                [(header::CONTENT_TYPE, headers::CONTENT_TYPE_JSON)],
                body,
            )
                .into_response();
            response.headers_mut().extend(response_headers);
            return response;
        }
        tokio::select! {
            _ = shared.closed.cancelled() => {
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, "session closed");
            }
            () = guard.wait() => {}
        }
    }
}
