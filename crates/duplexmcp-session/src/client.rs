//! The client endpoint.
//!
//! A [`Client`] holds the handler set for server-initiated requests
//! (sampling, elicitation), the roots catalog, and notification callbacks.
//! [`Client::connect`] performs the initialize handshake and returns a
//! [`ClientSession`] with typed calls for every server method.
//!
//! Capabilities are derived from the registered handlers unless overridden:
//! registering a with-tools sampling handler advertises the sampling `tools`
//! sub-capability, an elicitation handler advertises its supported modes, and
//! the roots capability is always present.

use async_trait::async_trait;
use duplexmcp_protocol::jsonrpc::JsonRpcError;
use duplexmcp_protocol::types::initialization::{
    InitializeParams, InitializeResult, InitializedParams,
};
use duplexmcp_protocol::types::{
    CallToolParams, CallToolResult, ClientCapabilities, CompleteParams, CompleteResult,
    CreateMessageParams, CreateMessageParamsWithTools, CreateMessageResult,
    CreateMessageResultWithTools, ElicitParams, ElicitResult, ElicitationCapabilities,
    ElicitationCompleteParams, ElicitationMode, GetPromptParams, GetPromptResult,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListRootsResult,
    ListToolsResult, LoggingLevel, LoggingMessageParams, ReadResourceParams, ReadResourceResult,
    ResourceUpdatedParams, Root, RootsCapabilities, SamplingCapabilities, SamplingMessage,
    SetLevelParams, SubscribeParams, UnsubscribeParams,
};
use duplexmcp_protocol::{
    Implementation, LATEST_PROTOCOL_VERSION, ProtocolError, error_codes, methods,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::context::{BoxError, RequestContext};
use crate::error::{SessionError, SessionResult};
use crate::features::FeatureRegistry;
use crate::middleware::Middleware;
use crate::session::{self, Dispatcher, RequestOptions, SessionConfig, SessionHandle};
use crate::transport::Transport;

/// Handles `sampling/createMessage` (singular content).
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    /// Produce a sampled message.
    async fn create_message(
        &self,
        ctx: RequestContext,
        params: CreateMessageParams,
    ) -> Result<CreateMessageResult, BoxError>;
}

/// Handles `sampling/createMessageWithTools` (array content, tool use).
#[async_trait]
pub trait SamplingWithToolsHandler: Send + Sync {
    /// Produce a sampled message, possibly containing tool-use blocks.
    async fn create_message_with_tools(
        &self,
        ctx: RequestContext,
        params: CreateMessageParamsWithTools,
    ) -> Result<CreateMessageResultWithTools, BoxError>;
}

/// Handles `elicitation/create`.
#[async_trait]
pub trait ElicitationHandler: Send + Sync {
    /// Collect input from the user.
    async fn elicit(
        &self,
        ctx: RequestContext,
        params: ElicitParams,
    ) -> Result<ElicitResult, BoxError>;

    /// Whether this handler renders inline schema forms.
    fn supports_form(&self) -> bool {
        true
    }

    /// Whether this handler can open external elicitation URLs.
    fn supports_url(&self) -> bool {
        false
    }
}

/// Client configuration.
#[derive(Clone, Default)]
pub struct ClientOptions {
    /// Keepalive ping interval; zero disables keepalive.
    pub keepalive: Duration,
    /// Explicit capabilities; when set, handler-derived capabilities are not
    /// used.
    pub capabilities: Option<ClientCapabilities>,
}

type LogCallback = Arc<dyn Fn(LoggingMessageParams) + Send + Sync>;
type ListChangedCallback = Arc<dyn Fn() + Send + Sync>;
type ResourceUpdatedCallback = Arc<dyn Fn(ResourceUpdatedParams) + Send + Sync>;
type ElicitationCompleteCallback = Arc<dyn Fn(ElicitationCompleteParams) + Send + Sync>;

#[derive(Default)]
struct ClientHandlers {
    sampling: Option<Arc<dyn SamplingHandler>>,
    sampling_with_tools: Option<Arc<dyn SamplingWithToolsHandler>>,
    elicitation: Option<Arc<dyn ElicitationHandler>>,
    on_log: Option<LogCallback>,
    on_tools_changed: Option<ListChangedCallback>,
    on_prompts_changed: Option<ListChangedCallback>,
    on_resources_changed: Option<ListChangedCallback>,
    on_resource_updated: Option<ResourceUpdatedCallback>,
    on_elicitation_complete: Option<ElicitationCompleteCallback>,
}

struct ClientInner {
    info: Implementation,
    options: ClientOptions,
    handlers: RwLock<ClientHandlers>,
    roots: FeatureRegistry<Root>,
    roots_timer: AtomicBool,
    sending_middleware: Mutex<Vec<Arc<dyn Middleware>>>,
    receiving_middleware: Mutex<Vec<Arc<dyn Middleware>>>,
    sessions: Mutex<Vec<SessionHandle>>,
    notification_delay: Duration,
}

/// An MCP client: handler set, roots catalog, and session factory.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client with the given identity.
    pub fn new(name: impl Into<String>, version: impl Into<String>, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                info: Implementation::new(name, version),
                options,
                handlers: RwLock::new(ClientHandlers::default()),
                roots: FeatureRegistry::new(),
                roots_timer: AtomicBool::new(false),
                sending_middleware: Mutex::new(Vec::new()),
                receiving_middleware: Mutex::new(Vec::new()),
                sessions: Mutex::new(Vec::new()),
                notification_delay: Duration::from_millis(10),
            }),
        }
    }

    /// Install the singular-content sampling handler.
    pub fn set_sampling_handler(&self, handler: Arc<dyn SamplingHandler>) {
        self.inner.handlers.write().sampling = Some(handler);
    }

    /// Install the with-tools sampling handler.
    ///
    /// When this is the only sampling handler, plain
    /// `sampling/createMessage` requests are adapted onto it.
    pub fn set_sampling_with_tools_handler(&self, handler: Arc<dyn SamplingWithToolsHandler>) {
        self.inner.handlers.write().sampling_with_tools = Some(handler);
    }

    /// Install the elicitation handler.
    pub fn set_elicitation_handler(&self, handler: Arc<dyn ElicitationHandler>) {
        self.inner.handlers.write().elicitation = Some(handler);
    }

    /// Install the callback for `notifications/message` log messages.
    pub fn on_log(&self, callback: LogCallback) {
        self.inner.handlers.write().on_log = Some(callback);
    }

    /// Install the callback for `notifications/tools/list_changed`.
    pub fn on_tools_list_changed(&self, callback: ListChangedCallback) {
        self.inner.handlers.write().on_tools_changed = Some(callback);
    }

    /// Install the callback for `notifications/prompts/list_changed`.
    pub fn on_prompts_list_changed(&self, callback: ListChangedCallback) {
        self.inner.handlers.write().on_prompts_changed = Some(callback);
    }

    /// Install the callback for `notifications/resources/list_changed`.
    pub fn on_resources_list_changed(&self, callback: ListChangedCallback) {
        self.inner.handlers.write().on_resources_changed = Some(callback);
    }

    /// Install the callback for `notifications/resources/updated`.
    pub fn on_resource_updated(&self, callback: ResourceUpdatedCallback) {
        self.inner.handlers.write().on_resource_updated = Some(callback);
    }

    /// Install the callback for `notifications/elicitation/complete`.
    pub fn on_elicitation_complete(&self, callback: ElicitationCompleteCallback) {
        self.inner.handlers.write().on_elicitation_complete = Some(callback);
    }

    /// Append a middleware to the sending chain (outermost first).
    pub fn add_sending_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.inner.sending_middleware.lock().push(middleware);
    }

    /// Append a middleware to the receiving chain (outermost first).
    pub fn add_receiving_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.inner.receiving_middleware.lock().push(middleware);
    }

    /// Add (or replace) a filesystem root, keyed by URI.
    pub fn add_root(&self, root: Root) {
        let uri = root.uri.clone();
        self.inner.roots.add(uri, root);
        self.schedule_roots_changed();
    }

    /// Remove roots by URI; unknown URIs are ignored.
    pub fn remove_roots<I, S>(&self, uris: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.inner.roots.remove(uris) {
            self.schedule_roots_changed();
        }
    }

    /// The capabilities this client will advertise.
    pub fn capabilities(&self) -> ClientCapabilities {
        if let Some(explicit) = &self.inner.options.capabilities {
            return explicit.clone();
        }
        let handlers = self.inner.handlers.read();
        let sampling = if handlers.sampling.is_some() || handlers.sampling_with_tools.is_some() {
            Some(SamplingCapabilities {
                tools: handlers
                    .sampling_with_tools
                    .as_ref()
                    .map(|_| serde_json::Map::new()),
                context: None,
            })
        } else {
            None
        };
        let elicitation = handlers.elicitation.as_ref().map(|h| ElicitationCapabilities {
            form: h.supports_form().then(serde_json::Map::new),
            url: h.supports_url().then(serde_json::Map::new),
        });
        ClientCapabilities {
            experimental: None,
            roots: Some(RootsCapabilities {
                list_changed: Some(true),
            }),
            sampling,
            elicitation,
        }
    }

    /// Connect a transport, run the initialize handshake, and return the
    /// live session.
    pub async fn connect(&self, transport: impl Transport + 'static) -> SessionResult<ClientSession> {
        let conn = Box::new(transport).connect().await?;
        let dispatcher = Arc::new(ClientDispatcher {
            client: self.inner.clone(),
        });
        let handle = session::start(
            conn,
            SessionConfig {
                dispatcher,
                sending_middleware: self.inner.sending_middleware.lock().clone(),
                receiving_middleware: self.inner.receiving_middleware.lock().clone(),
                keepalive: self.inner.options.keepalive,
                session_id: None,
            },
        );

        let params = InitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities(),
            client_info: self.inner.info.clone(),
            meta: None,
        };
        let init = async {
            let value = handle
                .request(methods::INITIALIZE, Some(to_value(&params)?))
                .await?;
            let result: InitializeResult = from_value(value)?;
            handle
                .notify(
                    methods::NOTIFICATION_INITIALIZED,
                    Some(to_value(&InitializedParams::default())?),
                )
                .await?;
            Ok::<_, SessionError>(result)
        }
        .await;

        let init = match init {
            Ok(init) => init,
            Err(err) => {
                let _ = handle.close().await;
                return Err(err);
            }
        };

        self.inner.sessions.lock().push(handle.clone());
        let client = self.inner.clone();
        let reap = handle.clone();
        tokio::spawn(async move {
            let _ = reap.wait().await;
            client
                .sessions
                .lock()
                .retain(|h| h.session_id() != reap.session_id());
        });

        Ok(ClientSession {
            handle,
            init: Arc::new(init),
        })
    }

    fn schedule_roots_changed(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let _ = self.inner.roots.take_dirty();
            return;
        };
        if self.inner.roots_timer.swap(true, Ordering::SeqCst) {
            return;
        }
        let client = self.inner.clone();
        runtime.spawn(async move {
            tokio::time::sleep(client.notification_delay).await;
            client.roots_timer.store(false, Ordering::SeqCst);
            if !client.roots.take_dirty() {
                return;
            }
            let sessions: Vec<_> = client.sessions.lock().clone();
            for session in sessions {
                if let Err(err) = session
                    .notify(methods::NOTIFICATION_ROOTS_LIST_CHANGED, None)
                    .await
                {
                    debug!(error = %err, "failed to send roots list-changed notification");
                }
            }
        });
    }
}

/// One live client-side session, post-handshake.
#[derive(Clone)]
pub struct ClientSession {
    handle: SessionHandle,
    init: Arc<InitializeResult>,
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("handle", &self.handle)
            .field("init", &self.init)
            .finish()
    }
}

impl ClientSession {
    /// The raw session handle.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// The server's initialize result (version, capabilities, identity).
    pub fn initialize_result(&self) -> &InitializeResult {
        &self.init
    }

    /// Liveness check.
    pub async fn ping(&self) -> SessionResult<()> {
        self.handle.ping().await
    }

    /// List tools, one page at a time.
    pub async fn list_tools(&self, cursor: Option<String>) -> SessionResult<ListToolsResult> {
        self.paginated(methods::TOOLS_LIST, cursor).await
    }

    /// Call a tool by name.
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> SessionResult<CallToolResult> {
        self.call_tool_with(name, arguments, RequestOptions::default())
            .await
    }

    /// Call a tool with per-request options (progress callback, cancellation).
    pub async fn call_tool_with(
        &self,
        name: impl Into<String>,
        arguments: Option<serde_json::Map<String, Value>>,
        options: RequestOptions,
    ) -> SessionResult<CallToolResult> {
        let params = CallToolParams {
            name: name.into(),
            arguments,
            meta: None,
        };
        let value = self
            .handle
            .request_with(methods::TOOLS_CALL, Some(to_value(&params)?), options)
            .await?;
        from_value(value)
    }

    /// List prompts, one page at a time.
    pub async fn list_prompts(&self, cursor: Option<String>) -> SessionResult<ListPromptsResult> {
        self.paginated(methods::PROMPTS_LIST, cursor).await
    }

    /// Expand a prompt.
    pub async fn get_prompt(&self, params: GetPromptParams) -> SessionResult<GetPromptResult> {
        let value = self
            .handle
            .request(methods::PROMPTS_GET, Some(to_value(&params)?))
            .await?;
        from_value(value)
    }

    /// List resources, one page at a time.
    pub async fn list_resources(
        &self,
        cursor: Option<String>,
    ) -> SessionResult<ListResourcesResult> {
        self.paginated(methods::RESOURCES_LIST, cursor).await
    }

    /// List resource templates, one page at a time.
    pub async fn list_resource_templates(
        &self,
        cursor: Option<String>,
    ) -> SessionResult<ListResourceTemplatesResult> {
        self.paginated(methods::RESOURCES_TEMPLATES_LIST, cursor).await
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: impl Into<String>) -> SessionResult<ReadResourceResult> {
        let params = ReadResourceParams {
            uri: uri.into(),
            meta: None,
        };
        let value = self
            .handle
            .request(methods::RESOURCES_READ, Some(to_value(&params)?))
            .await?;
        from_value(value)
    }

    /// Subscribe to change notifications for a resource.
    pub async fn subscribe(&self, uri: impl Into<String>) -> SessionResult<()> {
        let params = SubscribeParams {
            uri: uri.into(),
            meta: None,
        };
        self.handle
            .request(methods::RESOURCES_SUBSCRIBE, Some(to_value(&params)?))
            .await
            .map(|_| ())
    }

    /// Drop a resource subscription.
    pub async fn unsubscribe(&self, uri: impl Into<String>) -> SessionResult<()> {
        let params = UnsubscribeParams {
            uri: uri.into(),
            meta: None,
        };
        self.handle
            .request(methods::RESOURCES_UNSUBSCRIBE, Some(to_value(&params)?))
            .await
            .map(|_| ())
    }

    /// Choose the minimum log level the server should forward.
    pub async fn set_logging_level(&self, level: LoggingLevel) -> SessionResult<()> {
        let params = SetLevelParams { level, meta: None };
        self.handle
            .request(methods::LOGGING_SET_LEVEL, Some(to_value(&params)?))
            .await
            .map(|_| ())
    }

    /// Ask for argument completion suggestions.
    pub async fn complete(&self, params: CompleteParams) -> SessionResult<CompleteResult> {
        let value = self
            .handle
            .request(methods::COMPLETION_COMPLETE, Some(to_value(&params)?))
            .await?;
        from_value(value)
    }

    /// Close the session.
    pub async fn close(&self) -> SessionResult<()> {
        self.handle.close().await
    }

    /// Await session termination; `None` after a local close.
    pub async fn wait(&self) -> Option<SessionError> {
        self.handle.wait().await
    }

    async fn paginated<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        cursor: Option<String>,
    ) -> SessionResult<T> {
        let params = cursor.map(|c| json!({"cursor": c}));
        let value = self.handle.request(method, params).await?;
        from_value(value)
    }
}

struct ClientDispatcher {
    client: Arc<ClientInner>,
}

#[async_trait]
impl Dispatcher for ClientDispatcher {
    async fn dispatch(&self, ctx: RequestContext, params: Option<Value>) -> SessionResult<Value> {
        let method = ctx.method().to_string();
        match method.as_str() {
            methods::PING => Ok(json!({})),
            methods::ROOTS_LIST => {
                let (roots, _) = self.client.roots.list(None, usize::MAX)?;
                to_value(&ListRootsResult { roots, meta: None })
            }
            methods::SAMPLING_CREATE_MESSAGE => self.create_message(ctx, params).await,
            methods::SAMPLING_CREATE_MESSAGE_WITH_TOOLS => {
                self.create_message_with_tools(ctx, params).await
            }
            methods::ELICITATION_CREATE => self.elicit(ctx, params).await,
            other => Err(SessionError::Protocol(ProtocolError::MethodNotFound(
                other.to_string(),
            ))),
        }
    }

    async fn notification(&self, _session: SessionHandle, method: &str, params: Option<Value>) {
        let handlers = self.client.handlers.read();
        match method {
            methods::NOTIFICATION_MESSAGE => {
                if let (Some(callback), Some(params)) = (
                    handlers.on_log.clone(),
                    params.and_then(|p| serde_json::from_value::<LoggingMessageParams>(p).ok()),
                ) {
                    drop(handlers);
                    callback(params);
                }
            }
            methods::NOTIFICATION_TOOLS_LIST_CHANGED => {
                if let Some(callback) = handlers.on_tools_changed.clone() {
                    drop(handlers);
                    callback();
                }
            }
            methods::NOTIFICATION_PROMPTS_LIST_CHANGED => {
                if let Some(callback) = handlers.on_prompts_changed.clone() {
                    drop(handlers);
                    callback();
                }
            }
            methods::NOTIFICATION_RESOURCES_LIST_CHANGED => {
                if let Some(callback) = handlers.on_resources_changed.clone() {
                    drop(handlers);
                    callback();
                }
            }
            methods::NOTIFICATION_RESOURCES_UPDATED => {
                if let (Some(callback), Some(params)) = (
                    handlers.on_resource_updated.clone(),
                    params.and_then(|p| serde_json::from_value::<ResourceUpdatedParams>(p).ok()),
                ) {
                    drop(handlers);
                    callback(params);
                }
            }
            methods::NOTIFICATION_ELICITATION_COMPLETE => {
                if let (Some(callback), Some(params)) = (
                    handlers.on_elicitation_complete.clone(),
                    params
                        .and_then(|p| serde_json::from_value::<ElicitationCompleteParams>(p).ok()),
                ) {
                    drop(handlers);
                    callback(params);
                }
            }
            other => {
                debug!(method = other, "ignoring unhandled notification");
            }
        }
    }
}

impl ClientDispatcher {
    async fn create_message(&self, ctx: RequestContext, params: Option<Value>) -> SessionResult<Value> {
        let (base, with_tools) = {
            let handlers = self.client.handlers.read();
            (
                handlers.sampling.clone(),
                handlers.sampling_with_tools.clone(),
            )
        };

        // Tolerate array-valued content on the wire by parsing the with-tools
        // shape, then narrowing per message.
        let params: CreateMessageParamsWithTools = parse_params(params)?;

        if let Some(handler) = base {
            let narrowed = narrow_params(params)?;
            let result = handler
                .create_message(ctx, narrowed)
                .await
                .map_err(handler_error)?;
            return to_value(&result);
        }

        if let Some(handler) = with_tools {
            let result = handler
                .create_message_with_tools(ctx, params)
                .await
                .map_err(handler_error)?;
            result.validate()?;
            let single = result.into_single()?;
            return to_value(&single);
        }

        Err(unsupported("sampling", methods::SAMPLING_CREATE_MESSAGE))
    }

    async fn create_message_with_tools(
        &self,
        ctx: RequestContext,
        params: Option<Value>,
    ) -> SessionResult<Value> {
        let handler = self.client.handlers.read().sampling_with_tools.clone();
        let Some(handler) = handler else {
            return Err(unsupported(
                "sampling with tools",
                methods::SAMPLING_CREATE_MESSAGE_WITH_TOOLS,
            ));
        };
        let params: CreateMessageParamsWithTools = parse_params(params)?;
        for message in &params.messages {
            message.validate()?;
        }
        let result = handler
            .create_message_with_tools(ctx, params)
            .await
            .map_err(handler_error)?;
        result.validate()?;
        to_value(&result)
    }

    async fn elicit(&self, ctx: RequestContext, params: Option<Value>) -> SessionResult<Value> {
        let handler = self.client.handlers.read().elicitation.clone();
        let Some(handler) = handler else {
            return Err(unsupported("elicitation", methods::ELICITATION_CREATE));
        };
        let params: ElicitParams = parse_params(params)?;
        if params.mode.unwrap_or_default() == ElicitationMode::Url && !handler.supports_url() {
            return Err(unsupported(
                "url elicitation",
                methods::ELICITATION_CREATE,
            ));
        }
        let result = handler.elicit(ctx, params).await.map_err(handler_error)?;
        to_value(&result)
    }
}

/// Narrow with-tools params onto the singular-content shape, taking the one
/// content block of each message.
fn narrow_params(params: CreateMessageParamsWithTools) -> SessionResult<CreateMessageParams> {
    let mut messages = Vec::with_capacity(params.messages.len());
    for mut message in params.messages {
        if message.content.0.len() != 1 {
            return Err(SessionError::Protocol(ProtocolError::InvalidParams(
                format!(
                    "message has {} content blocks; use {} for multi-block messages",
                    message.content.0.len(),
                    methods::SAMPLING_CREATE_MESSAGE_WITH_TOOLS
                ),
            )));
        }
        messages.push(SamplingMessage {
            role: message.role,
            content: message.content.0.remove(0),
        });
    }
    Ok(CreateMessageParams {
        messages,
        model_preferences: params.model_preferences,
        system_prompt: params.system_prompt,
        include_context: params.include_context,
        temperature: params.temperature,
        max_tokens: params.max_tokens,
        stop_sequences: params.stop_sequences,
        metadata: params.metadata,
        meta: params.meta,
    })
}

fn unsupported(capability: &str, method: &str) -> SessionError {
    SessionError::Rpc(JsonRpcError::new(
        error_codes::METHOD_NOT_FOUND,
        format!("{method} unsupported: client has no {capability} handler"),
    ))
}

fn handler_error(error: BoxError) -> SessionError {
    SessionError::Handler(error.to_string())
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> SessionResult<T> {
    serde_json::from_value(params.unwrap_or(Value::Object(serde_json::Map::new())))
        .map_err(|e| SessionError::Protocol(ProtocolError::InvalidParams(e.to_string())))
}

fn to_value<T: serde::Serialize>(value: &T) -> SessionResult<Value> {
    serde_json::to_value(value).map_err(|e| SessionError::Handler(e.to_string()))
}

fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> SessionResult<T> {
    serde_json::from_value(value)
        .map_err(|e| SessionError::Protocol(ProtocolError::InvalidParams(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplexmcp_protocol::types::content::{Content, ContentList};
    use duplexmcp_protocol::types::{Role, SamplingMessageWithTools};

    #[test]
    fn test_capabilities_without_handlers() {
        let client = Client::new("c", "1", ClientOptions::default());
        let caps = client.capabilities();
        assert!(caps.roots.is_some());
        assert!(caps.sampling.is_none());
        assert!(caps.elicitation.is_none());
    }

    #[test]
    fn test_with_tools_handler_advertises_sub_capability() {
        struct Handler;
        #[async_trait]
        impl SamplingWithToolsHandler for Handler {
            async fn create_message_with_tools(
                &self,
                _ctx: RequestContext,
                _params: CreateMessageParamsWithTools,
            ) -> Result<CreateMessageResultWithTools, BoxError> {
                unimplemented!("capability test only")
            }
        }
        let client = Client::new("c", "1", ClientOptions::default());
        client.set_sampling_with_tools_handler(Arc::new(Handler));
        let caps = client.capabilities();
        let sampling = caps.sampling.expect("sampling advertised");
        assert!(sampling.tools.is_some());
    }

    #[test]
    fn test_explicit_capabilities_override() {
        let client = Client::new(
            "c",
            "1",
            ClientOptions {
                keepalive: Duration::ZERO,
                capabilities: Some(ClientCapabilities::default()),
            },
        );
        let caps = client.capabilities();
        assert!(caps.roots.is_none());
    }

    #[test]
    fn test_narrow_params_rejects_multi_block() {
        let params = CreateMessageParamsWithTools {
            messages: vec![SamplingMessageWithTools {
                role: Role::User,
                content: ContentList(vec![Content::text("a"), Content::text("b")]),
            }],
            tools: None,
            model_preferences: None,
            system_prompt: None,
            include_context: None,
            temperature: None,
            max_tokens: 10,
            stop_sequences: None,
            metadata: None,
            meta: None,
        };
        let err = narrow_params(params).unwrap_err();
        assert!(err.to_string().contains("sampling/createMessageWithTools"));
    }
}
