//! The session machine.
//!
//! One session owns one connection. A reader task classifies inbound
//! messages; every incoming request is dispatched in its own task so a slow
//! handler can never stall the reader (this is what keeps
//! server-client-server upcall chains deadlock-free). Outgoing requests are
//! correlated through a waiter map keyed by a monotonic numeric ID, and each
//! waiter observes exactly one outcome: the response, a local cancellation,
//! or the connection-closed sentinel when the session terminates.

use duplexmcp_protocol::jsonrpc::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use duplexmcp_protocol::methods;
use duplexmcp_protocol::types::core::{progress_token_from_meta, set_progress_token};
use duplexmcp_protocol::types::notifications::{CancelledParams, ProgressParams};
use duplexmcp_protocol::types::ProgressToken;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::{Direction, RequestContext};
use crate::error::{SessionError, SessionResult};
use crate::middleware::{Endpoint, Middleware, run_chain};
use crate::transport::{Connection, Outbound};

/// Callback invoked for each progress notification tied to a request.
pub type ProgressCallback = Arc<dyn Fn(ProgressParams) + Send + Sync>;

/// Receives incoming requests and notifications for one endpoint role.
#[async_trait::async_trait]
pub(crate) trait Dispatcher: Send + Sync {
    /// Handle an incoming request; the method is in `ctx`.
    async fn dispatch(&self, ctx: RequestContext, params: Option<Value>) -> SessionResult<Value>;

    /// Handle an incoming notification.
    async fn notification(&self, session: SessionHandle, method: &str, params: Option<Value>);
}

/// Configuration for starting a session.
pub(crate) struct SessionConfig {
    pub dispatcher: Arc<dyn Dispatcher>,
    pub sending_middleware: Vec<Arc<dyn Middleware>>,
    pub receiving_middleware: Vec<Arc<dyn Middleware>>,
    /// Ping interval; zero disables keepalive.
    pub keepalive: Duration,
    /// Session identifier; falls back to the connection's, then a fresh one.
    pub session_id: Option<String>,
}

/// Options for a single outgoing request.
#[derive(Default, Clone)]
pub struct RequestOptions {
    /// Token the caller may cancel to abandon the request. Cancelling emits
    /// `notifications/cancelled` to the peer.
    pub cancellation: Option<CancellationToken>,
    /// Callback for progress notifications. Setting this injects a progress
    /// token into the request's `_meta` when none is present.
    pub on_progress: Option<ProgressCallback>,
}

struct SessionInner {
    conn: Box<dyn Connection>,
    session_id: String,
    dispatcher: Arc<dyn Dispatcher>,
    sending_middleware: Vec<Arc<dyn Middleware>>,
    receiving_middleware: Vec<Arc<dyn Middleware>>,
    next_request_id: AtomicI64,
    waiters: Mutex<HashMap<i64, oneshot::Sender<SessionResult<Value>>>>,
    in_flight: Mutex<HashMap<RequestId, CancellationToken>>,
    progress_callbacks: Mutex<HashMap<ProgressToken, ProgressCallback>>,
    /// Cancelled when the session begins terminating, for any reason.
    closing: CancellationToken,
    /// Reader outcome, set exactly once.
    finished: Mutex<Option<Option<SessionError>>>,
    finished_notify: Notify,
}

/// A cheaply clonable handle to a running session.
///
/// Handles obtained from [`RequestContext::session`](crate::RequestContext::session)
/// carry the originating request ID so stream-oriented transports can route
/// messages produced inside a handler onto that request's channel.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Option<Arc<SessionInner>>,
    origin: Option<RequestId>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.inner.as_ref().map(|inner| &inner.session_id))
            .field("origin", &self.origin)
            .finish()
    }
}

impl SessionHandle {
    /// A handle connected to nothing; every operation fails with
    /// [`SessionError::ConnectionClosed`]. Useful in tests.
    pub fn detached() -> Self {
        Self {
            inner: None,
            origin: None,
        }
    }

    pub(crate) fn scoped_to(&self, origin: RequestId) -> Self {
        Self {
            inner: self.inner.clone(),
            origin: Some(origin),
        }
    }

    fn inner(&self) -> SessionResult<&Arc<SessionInner>> {
        self.inner.as_ref().ok_or(SessionError::ConnectionClosed)
    }

    /// The session's opaque identifier.
    pub fn session_id(&self) -> String {
        self.inner
            .as_ref()
            .map(|i| i.session_id.clone())
            .unwrap_or_default()
    }

    /// Whether the session has begun terminating.
    pub fn is_closing(&self) -> bool {
        self.inner
            .as_ref()
            .is_none_or(|i| i.closing.is_cancelled())
    }

    /// Issue a request and await its result.
    pub async fn request(&self, method: &str, params: Option<Value>) -> SessionResult<Value> {
        self.request_with(method, params, RequestOptions::default())
            .await
    }

    /// Issue a request with per-request options.
    pub async fn request_with(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> SessionResult<Value> {
        let inner = self.inner()?.clone();
        let id_num = inner.next_request_id.fetch_add(1, Ordering::SeqCst);
        let id = RequestId::Number(id_num);

        let (params, progress_token) = attach_progress_token(params, &id, &options)?;
        if let (Some(token), Some(callback)) = (&progress_token, &options.on_progress) {
            inner
                .progress_callbacks
                .lock()
                .insert(token.clone(), callback.clone());
        }

        let cancellation = options
            .cancellation
            .clone()
            .unwrap_or_else(CancellationToken::new);
        let ctx = RequestContext::new(
            self.clone(),
            id.clone(),
            method.to_string(),
            Direction::Outgoing,
            progress_token.clone(),
            cancellation.clone(),
        );

        let origin = self.origin.clone();
        let send_inner = inner.clone();
        let endpoint: Endpoint = Arc::new(move |_ctx, method, params| {
            let inner = send_inner.clone();
            let id = RequestId::Number(id_num);
            let origin = origin.clone();
            let cancellation = cancellation.clone();
            Box::pin(async move {
                send_and_await(inner, id, id_num, method, params, origin, cancellation).await
            })
        });

        let result = run_chain(
            &inner.sending_middleware,
            &endpoint,
            ctx,
            method.to_string(),
            params,
        )
        .await;

        if let Some(token) = &progress_token {
            inner.progress_callbacks.lock().remove(token);
        }
        result
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> SessionResult<()> {
        let inner = self.inner()?;
        inner
            .conn
            .write(Outbound::with_origin(
                JsonRpcMessage::Notification(JsonRpcNotification::new(method, params)),
                self.origin.clone(),
            ))
            .await
    }

    /// Liveness check.
    pub async fn ping(&self) -> SessionResult<()> {
        self.request(methods::PING, None).await.map(|_| ())
    }

    /// Close the session. The reader observes end of stream, every pending
    /// waiter receives the connection-closed sentinel, and the peer sees EOF.
    pub async fn close(&self) -> SessionResult<()> {
        let Some(inner) = self.inner.as_ref() else {
            return Ok(());
        };
        if inner.closing.is_cancelled() {
            return Ok(());
        }
        inner.closing.cancel();
        let _ = inner.conn.close().await;
        fail_waiters(inner);
        Ok(())
    }

    /// Terminate the session recording `error` as the reader outcome.
    pub(crate) async fn abort(&self, error: SessionError) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        record_finish(inner, Some(error));
        inner.closing.cancel();
        let _ = inner.conn.close().await;
        fail_waiters(inner);
    }

    /// Await session termination and return the reader's final outcome:
    /// `None` after a local close, the terminal error otherwise.
    pub async fn wait(&self) -> Option<SessionError> {
        let Some(inner) = self.inner.as_ref() else {
            return Some(SessionError::ConnectionClosed);
        };
        loop {
            let notified = inner.finished_notify.notified();
            if let Some(outcome) = inner.finished.lock().clone() {
                return outcome;
            }
            notified.await;
        }
    }
}

fn attach_progress_token(
    params: Option<Value>,
    id: &RequestId,
    options: &RequestOptions,
) -> SessionResult<(Option<Value>, Option<ProgressToken>)> {
    if options.on_progress.is_none() {
        return Ok((params, None));
    }
    let mut object = match params {
        None => serde_json::Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(SessionError::Protocol(
                duplexmcp_protocol::ProtocolError::InvalidParams(format!(
                    "params must be an object to carry a progress token, got {other}"
                )),
            ));
        }
    };
    let mut meta = match object.remove("_meta") {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    };
    let token = progress_token_from_meta(meta.as_ref()).unwrap_or_else(|| ProgressToken::from(id));
    set_progress_token(&mut meta, &token);
    if let Some(meta) = meta {
        object.insert("_meta".to_string(), Value::Object(meta));
    }
    Ok((Some(Value::Object(object)), Some(token)))
}

async fn send_and_await(
    inner: Arc<SessionInner>,
    id: RequestId,
    id_num: i64,
    method: String,
    params: Option<Value>,
    origin: Option<RequestId>,
    cancellation: CancellationToken,
) -> SessionResult<Value> {
    if inner.closing.is_cancelled() {
        return Err(SessionError::ConnectionClosed);
    }
    let (tx, rx) = oneshot::channel();
    inner.waiters.lock().insert(id_num, tx);

    let request = JsonRpcRequest::new(id.clone(), method, params);
    if let Err(err) = inner
        .conn
        .write(Outbound::with_origin(
            JsonRpcMessage::Request(request),
            origin.clone(),
        ))
        .await
    {
        inner.waiters.lock().remove(&id_num);
        return Err(err);
    }

    tokio::select! {
        outcome = rx => outcome.unwrap_or(Err(SessionError::ConnectionClosed)),
        _ = cancellation.cancelled() => {
            inner.waiters.lock().remove(&id_num);
            let params = CancelledParams {
                request_id: id,
                reason: None,
                meta: None,
            };
            let notification = JsonRpcNotification::with_params(
                methods::NOTIFICATION_CANCELLED,
                &params,
            )?;
            let conn_inner = inner.clone();
            tokio::spawn(async move {
                let _ = conn_inner
                    .conn
                    .write(Outbound::with_origin(
                        JsonRpcMessage::Notification(notification),
                        origin,
                    ))
                    .await;
            });
            Err(SessionError::Cancelled)
        }
    }
}

fn fail_waiters(inner: &Arc<SessionInner>) {
    let waiters: Vec<_> = inner.waiters.lock().drain().collect();
    for (_, tx) in waiters {
        let _ = tx.send(Err(SessionError::ConnectionClosed));
    }
}

fn record_finish(inner: &Arc<SessionInner>, outcome: Option<SessionError>) {
    let mut finished = inner.finished.lock();
    if finished.is_none() {
        *finished = Some(outcome);
    }
    drop(finished);
    inner.finished_notify.notify_waiters();
}

/// Start a session over an established connection.
pub(crate) fn start(conn: Box<dyn Connection>, config: SessionConfig) -> SessionHandle {
    let session_id = config
        .session_id
        .clone()
        .or_else(|| conn.session_id())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let inner = Arc::new(SessionInner {
        conn,
        session_id,
        dispatcher: config.dispatcher,
        sending_middleware: config.sending_middleware,
        receiving_middleware: config.receiving_middleware,
        next_request_id: AtomicI64::new(1),
        waiters: Mutex::new(HashMap::new()),
        in_flight: Mutex::new(HashMap::new()),
        progress_callbacks: Mutex::new(HashMap::new()),
        closing: CancellationToken::new(),
        finished: Mutex::new(None),
        finished_notify: Notify::new(),
    });
    let handle = SessionHandle {
        inner: Some(inner.clone()),
        origin: None,
    };

    tokio::spawn(reader_loop(inner.clone(), handle.clone()));

    if !config.keepalive.is_zero() {
        tokio::spawn(keepalive_loop(handle.clone(), config.keepalive));
    }

    handle
}

async fn reader_loop(inner: Arc<SessionInner>, handle: SessionHandle) {
    let outcome = loop {
        let read = tokio::select! {
            _ = inner.closing.cancelled() => break None,
            read = inner.conn.read() => read,
        };
        match read {
            Ok(Some(message)) => handle_message(&inner, &handle, message).await,
            Ok(None) => {
                // Local close makes the reader see EOF too; only a peer
                // close is an error outcome.
                if inner.closing.is_cancelled() {
                    break None;
                }
                break Some(SessionError::ConnectionClosed);
            }
            Err(err) => break Some(err),
        }
    };
    record_finish(&inner, outcome);
    inner.closing.cancel();
    fail_waiters(&inner);
}

async fn keepalive_loop(handle: SessionHandle, interval: Duration) {
    let Some(inner) = handle.inner.clone() else {
        return;
    };
    loop {
        tokio::select! {
            _ = inner.closing.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
        let ping = tokio::time::timeout(interval, handle.ping()).await;
        match ping {
            Ok(Ok(())) => {}
            _ => {
                debug!(session_id = %handle.session_id(), "keepalive ping failed, closing session");
                handle.abort(SessionError::ConnectionClosed).await;
                return;
            }
        }
    }
}

async fn handle_message(inner: &Arc<SessionInner>, handle: &SessionHandle, message: JsonRpcMessage) {
    let mut queue = VecDeque::from([message]);
    while let Some(message) = queue.pop_front() {
        match message {
            JsonRpcMessage::Batch(items) => queue.extend(items),
            JsonRpcMessage::Response(response) => handle_response(inner, response),
            JsonRpcMessage::Request(request) => handle_request(inner, handle, request),
            JsonRpcMessage::Notification(notification) => {
                handle_notification(inner, handle, notification).await;
            }
        }
    }
}

fn handle_response(inner: &Arc<SessionInner>, response: JsonRpcResponse) {
    let Some(RequestId::Number(id_num)) = response.id.as_request_id().cloned() else {
        warn!(id = ?response.id, "dropping response with non-numeric id");
        return;
    };
    let Some(tx) = inner.waiters.lock().remove(&id_num) else {
        warn!(id = id_num, "dropping response with no matching request");
        return;
    };
    let outcome = match response.result() {
        Some(result) => Ok(result.clone()),
        None => Err(SessionError::Rpc(
            response
                .error_object()
                .cloned()
                .unwrap_or_else(|| duplexmcp_protocol::JsonRpcError::new(-32603, "empty response")),
        )),
    };
    let _ = tx.send(outcome);
}

fn handle_request(inner: &Arc<SessionInner>, handle: &SessionHandle, request: JsonRpcRequest) {
    let JsonRpcRequest {
        id, method, params, ..
    } = request;

    let cancellation = inner.closing.child_token();
    if inner
        .in_flight
        .lock()
        .insert(id.clone(), cancellation.clone())
        .is_some()
    {
        warn!(id = %id, "duplicate in-flight request id, replacing cancellation handle");
    }

    let meta = params
        .as_ref()
        .and_then(Value::as_object)
        .and_then(|o| o.get("_meta"))
        .and_then(Value::as_object);
    let progress_token = progress_token_from_meta(meta);

    let ctx = RequestContext::new(
        handle.clone(),
        id.clone(),
        method.clone(),
        Direction::Incoming,
        progress_token,
        cancellation,
    );

    let inner = inner.clone();
    tokio::spawn(async move {
        let dispatcher = inner.dispatcher.clone();
        let endpoint: Endpoint = Arc::new(move |ctx, _method, params| {
            let dispatcher = dispatcher.clone();
            Box::pin(async move { dispatcher.dispatch(ctx, params).await })
        });
        let result = run_chain(
            &inner.receiving_middleware,
            &endpoint,
            ctx,
            method,
            params,
        )
        .await;

        inner.in_flight.lock().remove(&id);

        let response = match result {
            Ok(value) => JsonRpcResponse::success(id, sanitize_result(value)),
            Err(err) => JsonRpcResponse::error(id, err.to_json_rpc()),
        };
        let write = inner
            .conn
            .write(Outbound::with_origin(
                JsonRpcMessage::Response(response.clone()),
                response.id.as_request_id().cloned(),
            ))
            .await;
        if let Err(err) = write
            && !inner.closing.is_cancelled()
        {
            warn!(error = %err, "failed to send response");
        }
    });
}

/// Notifications are handled inline on the reader so state transitions (for
/// one, `notifications/initialized`) are observed by every later request.
/// Notification handlers must therefore not block.
async fn handle_notification(
    inner: &Arc<SessionInner>,
    handle: &SessionHandle,
    notification: JsonRpcNotification,
) {
    match notification.method.as_str() {
        methods::NOTIFICATION_CANCELLED => {
            let Some(params) = notification
                .params
                .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok())
            else {
                debug!("dropping malformed cancellation notification");
                return;
            };
            let token = inner.in_flight.lock().get(&params.request_id).cloned();
            match token {
                Some(token) => token.cancel(),
                None => debug!(id = %params.request_id, "cancellation for unknown request"),
            }
        }
        methods::NOTIFICATION_PROGRESS => {
            let Some(params) = notification
                .params
                .and_then(|p| serde_json::from_value::<ProgressParams>(p).ok())
            else {
                debug!("dropping malformed progress notification");
                return;
            };
            let callback = inner
                .progress_callbacks
                .lock()
                .get(&params.progress_token)
                .cloned();
            match callback {
                Some(callback) => callback(params),
                None => debug!(token = %params.progress_token, "progress for unknown token"),
            }
        }
        _ => {
            inner
                .dispatcher
                .notification(handle.clone(), &notification.method, notification.params)
                .await;
        }
    }
}

/// Strip top-level `null` fields from a result object before encoding.
///
/// Result objects must never emit `null` for their content fields; handler
/// code built from this crate's types cannot produce them, but raw-value
/// handlers can.
fn sanitize_result(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let had_nulls = map.values().any(Value::is_null);
            if had_nulls {
                warn!("stripping null fields from result object");
            }
            Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect())
        }
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    }
}
