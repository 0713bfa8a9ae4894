//! # duplexmcp-streamable
//!
//! The MCP streamable HTTP transport: stateful, resumable sessions layered
//! onto stateless HTTP with Server-Sent Events for server push.
//!
//! One URL serves three methods:
//!
//! - **POST** carries client messages in; requests answer with SSE (or plain
//!   JSON when [`StreamableServerConfig::json_response`] is set),
//!   notification-only posts answer `202 Accepted`.
//! - **GET** opens the long-lived server-push stream (stream 0), resumable
//!   via `Last-Event-ID`.
//! - **DELETE** terminates the session named by `Mcp-Session-Id`.
//!
//! Every SSE event is tagged `"<streamID>_<index>"`; per-stream buffers are
//! kept for the session lifetime so an interrupted stream can be replayed
//! from any index without loss or duplication.

pub mod client;
pub mod event;
pub mod server;
pub mod sse;

pub use client::{StreamableClientConfig, StreamableClientTransport};
pub use event::{format_event_id, parse_event_id};
pub use server::{StreamableServer, StreamableServerConfig};
pub use sse::{SseEvent, SseParser, encode_event};

/// Streamable HTTP header names.
pub mod headers {
    /// Session ID header for tracking stateful connections.
    pub const MCP_SESSION_ID: &str = "Mcp-Session-Id";

    /// Last event ID header for SSE resumption.
    pub const LAST_EVENT_ID: &str = "Last-Event-ID";

    /// Content type of JSON bodies.
    pub const CONTENT_TYPE_JSON: &str = "application/json";

    /// Content type of SSE streams.
    pub const CONTENT_TYPE_SSE: &str = "text/event-stream";
}

/// Default request body limit in bytes.
///
/// Configured limits follow the sign convention: `0` means this default,
/// negative means unlimited, positive is the limit itself.
pub const DEFAULT_MAX_BODY_BYTES: i64 = 1_000_000;

/// Resolve a configured body limit to an effective byte count.
pub fn effective_body_limit(configured: i64) -> usize {
    match configured {
        0 => DEFAULT_MAX_BODY_BYTES as usize,
        negative if negative < 0 => usize::MAX,
        positive => positive as usize,
    }
}
