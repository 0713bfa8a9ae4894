//! # duplexmcp-protocol
//!
//! Wire-level implementation of the Model Context Protocol: JSON-RPC 2.0
//! message framing, the polymorphic content model, and the full catalog of
//! MCP request/result/notification types.
//!
//! This crate is transport-agnostic and holds no I/O. The session machine
//! lives in `duplexmcp-session`; the streamable HTTP transport in
//! `duplexmcp-streamable`.
//!
//! ## Layout
//!
//! - [`jsonrpc`] - message envelopes and the `encode`/`decode` codec
//! - [`types`] - params/result structs for every protocol method
//! - [`methods`] - method name constants
//! - [`error`] - the protocol error taxonomy and JSON-RPC error codes

pub mod error;
pub mod jsonrpc;
pub mod methods;
pub mod types;

pub use error::{ProtocolError, error_codes};
pub use jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    ResponseId, decode, decode_batch, encode,
};
pub use types::core::{Cursor, Implementation, Meta, ProgressToken, Role};

/// Latest protocol revision this SDK speaks.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol revisions accepted during the initialize handshake, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Negotiate a protocol version against the peer's requested one.
///
/// Returns the requested version when supported, otherwise the latest
/// supported version (the peer decides whether to disconnect).
pub fn negotiate_protocol_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_negotiation() {
        assert_eq!(negotiate_protocol_version("2025-03-26"), "2025-03-26");
        assert_eq!(negotiate_protocol_version("1999-01-01"), LATEST_PROTOCOL_VERSION);
    }
}
