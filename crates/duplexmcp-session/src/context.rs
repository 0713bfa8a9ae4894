//! Per-request context handed to handlers and middleware.

use duplexmcp_protocol::jsonrpc::RequestId;
use duplexmcp_protocol::methods;
use duplexmcp_protocol::types::ProgressToken;
use duplexmcp_protocol::types::notifications::ProgressParams;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{SessionError, SessionResult};
use crate::session::SessionHandle;

/// Boxed error type handlers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which way a request is traveling through a middleware chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The request arrived from the peer and is being dispatched locally.
    Incoming,
    /// The request originates locally and is being sent to the peer.
    Outgoing,
}

/// Context for one request: the session it arrived on, its ID, its progress
/// token (if the caller supplied one), and its cancellation token.
///
/// Handlers may issue their own requests back to the peer through
/// [`session`](Self::session); those messages inherit this request's ID as
/// their routing origin so stream-oriented transports deliver them on the
/// request's channel.
#[derive(Clone)]
pub struct RequestContext {
    session: SessionHandle,
    request_id: RequestId,
    method: String,
    direction: Direction,
    progress_token: Option<ProgressToken>,
    cancellation: CancellationToken,
    tool_error: Arc<Mutex<Option<Arc<dyn std::error::Error + Send + Sync>>>>,
}

impl RequestContext {
    pub(crate) fn new(
        session: SessionHandle,
        request_id: RequestId,
        method: String,
        direction: Direction,
        progress_token: Option<ProgressToken>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            session,
            request_id,
            method,
            direction,
            progress_token,
            cancellation,
            tool_error: Arc::new(Mutex::new(None)),
        }
    }

    /// The original error a tool handler returned, if this request was a tool
    /// call that failed.
    ///
    /// This is the unserialized side channel behind `isError` tool results:
    /// receiving middleware can inspect the real error even though the wire
    /// only carries its message as text content.
    pub fn tool_error(&self) -> Option<Arc<dyn std::error::Error + Send + Sync>> {
        self.tool_error.lock().clone()
    }

    pub(crate) fn set_tool_error(&self, error: Arc<dyn std::error::Error + Send + Sync>) {
        *self.tool_error.lock() = Some(error);
    }

    /// The session this request belongs to.
    ///
    /// For incoming requests the returned handle scopes outbound messages to
    /// this request's delivery stream.
    pub fn session(&self) -> SessionHandle {
        match self.direction {
            Direction::Incoming => self.session.scoped_to(self.request_id.clone()),
            Direction::Outgoing => self.session.clone(),
        }
    }

    /// The request's wire ID.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// The request's method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Which direction this request is traveling.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The progress token the caller attached, if any.
    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.progress_token.as_ref()
    }

    /// This request's cancellation token.
    ///
    /// Cancelled when the peer sends `notifications/cancelled` for this
    /// request or the session closes.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Send a progress notification referencing this request's token.
    ///
    /// Fails with [`SessionError::NoProgressToken`] when the caller did not
    /// attach one; the error is non-fatal and the handler may continue.
    pub async fn progress(
        &self,
        message: impl Into<String>,
        progress: f64,
        total: Option<f64>,
    ) -> SessionResult<()> {
        let Some(token) = &self.progress_token else {
            return Err(SessionError::NoProgressToken);
        };
        let params = ProgressParams {
            progress_token: token.clone(),
            progress,
            total,
            message: Some(message.into()),
            meta: None,
        };
        self.session()
            .notify(methods::NOTIFICATION_PROGRESS, Some(serde_json::to_value(params).map_err(
                |e| SessionError::Handler(e.to_string()),
            )?))
            .await
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("direction", &self.direction)
            .field("progress_token", &self.progress_token)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}
