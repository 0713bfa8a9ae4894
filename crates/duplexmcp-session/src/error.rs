//! Session error taxonomy.

use duplexmcp_protocol::jsonrpc::JsonRpcError;
use duplexmcp_protocol::{ProtocolError, error_codes};
use thiserror::Error;

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by the session machine and the endpoints built on it.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The connection closed before the operation completed.
    ///
    /// This is the sentinel every pending waiter receives exactly once when a
    /// session terminates.
    #[error("connection closed")]
    ConnectionClosed,

    /// The request referenced a session the peer does not know.
    #[error("session not found")]
    SessionMissing,

    /// The request was cancelled locally before a response arrived.
    #[error("request cancelled")]
    Cancelled,

    /// A handler asked to report progress but the request carried no token.
    #[error("request has no progress token")]
    NoProgressToken,

    /// A feature request arrived before the initialization handshake finished.
    #[error("method {0:?} invalid during session initialization")]
    InvalidDuringInitialization(String),

    /// The peer (or a handler) produced a wire-level protocol error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The peer answered with a JSON-RPC error object.
    #[error("{0}")]
    Rpc(JsonRpcError),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A handler failed in a way that maps to an internal error.
    #[error("handler error: {0}")]
    Handler(String),
}

impl SessionError {
    /// Map this error onto a wire-level JSON-RPC error object.
    pub fn to_json_rpc(&self) -> JsonRpcError {
        match self {
            Self::ConnectionClosed => {
                JsonRpcError::new(error_codes::CONNECTION_CLOSED, self.to_string())
            }
            Self::SessionMissing => {
                JsonRpcError::new(error_codes::SESSION_MISSING, self.to_string())
            }
            Self::Cancelled => JsonRpcError::new(error_codes::INTERNAL_ERROR, self.to_string()),
            Self::NoProgressToken => {
                JsonRpcError::new(error_codes::INVALID_REQUEST, self.to_string())
            }
            Self::InvalidDuringInitialization(_) => {
                JsonRpcError::new(error_codes::INVALID_REQUEST, self.to_string())
            }
            Self::Protocol(err) => err.to_json_rpc(),
            Self::Rpc(err) => err.clone(),
            Self::Transport(_) | Self::Handler(_) => {
                JsonRpcError::new(error_codes::INTERNAL_ERROR, self.to_string())
            }
        }
    }

    /// Whether this error is the connection-closed sentinel.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

impl From<JsonRpcError> for SessionError {
    fn from(err: JsonRpcError) -> Self {
        Self::Rpc(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_closed_code() {
        let rpc = SessionError::ConnectionClosed.to_json_rpc();
        assert_eq!(rpc.code, error_codes::CONNECTION_CLOSED);
    }

    #[test]
    fn test_initialization_gate_message() {
        let err = SessionError::InvalidDuringInitialization("tools/list".into());
        assert!(err.to_string().contains("invalid during session initialization"));
        assert!(err.to_string().contains("tools/list"));
    }

    #[test]
    fn test_protocol_error_code_passthrough() {
        let err = SessionError::Protocol(ProtocolError::MethodNotFound("x".into()));
        assert_eq!(err.to_json_rpc().code, error_codes::METHOD_NOT_FOUND);
    }
}
