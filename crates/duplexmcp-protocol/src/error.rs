//! Protocol error taxonomy.
//!
//! [`ProtocolError`] classifies every failure this crate can produce and maps
//! each onto the matching JSON-RPC error code. Transport and session errors
//! live in their own crates and wrap these where a wire-level cause exists.

use serde_json::Value;
use thiserror::Error;

use crate::jsonrpc::JsonRpcError;

/// Well-known JSON-RPC and MCP error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// The connection was closed before a response arrived.
    pub const CONNECTION_CLOSED: i32 = -32000;
    /// The request referenced a session the peer does not know.
    pub const SESSION_MISSING: i32 = -32001;
}

/// Result alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while encoding, decoding, or validating protocol data.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// The bytes were not valid JSON.
    #[error("parse error: {0}")]
    Parse(String),

    /// The JSON did not form a valid JSON-RPC 2.0 message.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No handler is registered for the method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Parameters failed shape, range, or schema validation.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// The JSON-RPC error code for this error kind.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => error_codes::PARSE_ERROR,
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Self::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// Convert into a wire-level JSON-RPC error object.
    pub fn to_json_rpc(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.code(),
            message: self.to_string(),
            data: None,
        }
    }

    /// Convert into a JSON-RPC error object with structured context.
    pub fn to_json_rpc_with_data(&self, data: Value) -> JsonRpcError {
        JsonRpcError {
            code: self.code(),
            message: self.to_string(),
            data: Some(data),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_eof() {
            Self::Parse(err.to_string())
        } else {
            Self::InvalidRequest(err.to_string())
        }
    }
}
