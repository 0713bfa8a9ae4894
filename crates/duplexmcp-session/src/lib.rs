//! # duplexmcp-session
//!
//! The MCP session machine: request/response correlation, concurrent handler
//! dispatch, middleware pipelines, progress and cancellation propagation,
//! keepalive, feature registries with debounced list-changed notifications,
//! and the client and server endpoints built on top.
//!
//! Transports plug in through the [`transport::Transport`] and
//! [`transport::Connection`] traits; an in-process pipe pair is included for
//! same-process wiring and tests. The streamable HTTP transport lives in
//! `duplexmcp-streamable`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use duplexmcp_session::{Client, Server, ServerOptions, tool_handler};
//! use duplexmcp_session::transport::InMemoryTransport;
//! use duplexmcp_protocol::types::{CallToolResult, Tool};
//!
//! # async fn run() -> Result<(), duplexmcp_session::SessionError> {
//! let server = Server::new("demo", "0.1.0", ServerOptions::default());
//! server.add_tool(
//!     Tool::new("greet").with_description("Say hello"),
//!     tool_handler(|_ctx, args| async move {
//!         let name = args
//!             .as_ref()
//!             .and_then(|a| a.get("name"))
//!             .and_then(|v| v.as_str())
//!             .unwrap_or("world");
//!         Ok(CallToolResult::text(format!("hi {name}")))
//!     }),
//! );
//!
//! let (server_side, client_side) = InMemoryTransport::pair();
//! let _server_session = server.connect(server_side).await?;
//! let client = Client::new("demo-client", "0.1.0", Default::default());
//! let session = client.connect(client_side).await?;
//! let tools = session.list_tools(None).await?;
//! assert_eq!(tools.tools.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod context;
pub mod error;
pub mod features;
pub mod middleware;
pub mod server;
pub mod session;
pub mod store;
pub mod transport;

pub use client::{
    Client, ClientOptions, ClientSession, ElicitationHandler, SamplingHandler,
    SamplingWithToolsHandler,
};
pub use context::{BoxError, Direction, RequestContext};
pub use error::{SessionError, SessionResult};
pub use middleware::{Middleware, Next};
pub use server::{
    CompletionHandler, PromptHandler, ReadResourceHandler, Server, ServerOptions, ServerSession,
    ToolHandler, prompt_handler, resource_handler, tool_handler,
};
pub use session::{RequestOptions, SessionHandle};
pub use store::{MemorySessionStore, SessionState, SessionStore, StoreError};
pub use transport::{Connection, InMemoryTransport, Outbound, Transport};
