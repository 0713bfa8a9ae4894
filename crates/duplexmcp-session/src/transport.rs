//! Transport seam: how sessions reach the wire.
//!
//! A [`Transport`] yields a [`Connection`]; a connection produces a stream of
//! inbound messages and accepts outbound ones. The session machine owns one
//! connection exclusively and closes it when the session closes.
//!
//! Outbound messages travel inside an [`Outbound`] envelope carrying the
//! incoming request ID whose handler produced the message, when there is one.
//! Stream-oriented transports (streamable HTTP) use that origin to route the
//! message onto the right delivery channel; the in-memory pipe ignores it.

use async_trait::async_trait;
use duplexmcp_protocol::jsonrpc::{JsonRpcMessage, RequestId};
use tokio::sync::{Mutex, mpsc};

use crate::error::{SessionError, SessionResult};

type MessageSender = parking_lot::Mutex<Option<mpsc::Sender<JsonRpcMessage>>>;

/// An outbound message plus its routing origin.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// The message to deliver.
    pub message: JsonRpcMessage,
    /// The incoming request this message was produced under, if any.
    ///
    /// Responses carry their own ID here; requests and notifications emitted
    /// inside a handler carry the handler's request ID; everything else is
    /// `None`.
    pub origin: Option<RequestId>,
}

impl Outbound {
    /// An outbound message with no handler origin.
    pub fn new(message: JsonRpcMessage) -> Self {
        Self {
            message,
            origin: None,
        }
    }

    /// An outbound message produced under the given incoming request.
    pub fn with_origin(message: JsonRpcMessage, origin: Option<RequestId>) -> Self {
        Self { message, origin }
    }
}

/// A factory for connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a connection.
    async fn connect(self: Box<Self>) -> SessionResult<Box<dyn Connection>>;
}

/// A single bidirectional message pipe.
///
/// `read` is only ever called from the session's reader task; `write` and
/// `close` may be called from any task.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Receive the next inbound message. `Ok(None)` signals end of stream.
    async fn read(&self) -> SessionResult<Option<JsonRpcMessage>>;

    /// Send an outbound message.
    async fn write(&self, outbound: Outbound) -> SessionResult<()>;

    /// Close the connection; subsequent reads observe end of stream.
    async fn close(&self) -> SessionResult<()>;

    /// The transport-assigned session identifier, when one exists.
    fn session_id(&self) -> Option<String> {
        None
    }
}

/// In-process transport: a pair of connections joined by channels.
///
/// Used for tests and same-process client/server wiring.
pub struct InMemoryTransport {
    connection: InMemoryConnection,
}

impl InMemoryTransport {
    /// Create a connected transport pair.
    pub fn pair() -> (Self, Self) {
        let (a_to_b_tx, a_to_b_rx) = mpsc::channel(64);
        let (b_to_a_tx, b_to_a_rx) = mpsc::channel(64);
        let a = Self {
            connection: InMemoryConnection {
                tx: parking_lot::Mutex::new(Some(a_to_b_tx)),
                rx: Mutex::new(b_to_a_rx),
            },
        };
        let b = Self {
            connection: InMemoryConnection {
                tx: parking_lot::Mutex::new(Some(b_to_a_tx)),
                rx: Mutex::new(a_to_b_rx),
            },
        };
        (a, b)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn connect(self: Box<Self>) -> SessionResult<Box<dyn Connection>> {
        Ok(Box::new(self.connection))
    }
}

struct InMemoryConnection {
    tx: MessageSender,
    rx: Mutex<mpsc::Receiver<JsonRpcMessage>>,
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn read(&self) -> SessionResult<Option<JsonRpcMessage>> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn write(&self, outbound: Outbound) -> SessionResult<()> {
        let tx = self.tx.lock().clone();
        let Some(tx) = tx else {
            return Err(SessionError::ConnectionClosed);
        };
        tx.send(outbound.message)
            .await
            .map_err(|_| SessionError::ConnectionClosed)
    }

    async fn close(&self) -> SessionResult<()> {
        // Dropping the sender is what lets the peer's reader drain to EOF.
        self.tx.lock().take();
        self.rx.lock().await.close();
        Ok(())
    }
}
