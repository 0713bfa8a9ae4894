//! The server endpoint.
//!
//! A [`Server`] owns the feature catalogs (tools, prompts, resources,
//! templates) and serves any number of concurrent sessions; each call to
//! [`Server::connect`] binds one connection. Catalog mutations schedule a
//! single debounced list-changed notification per window across all ready
//! sessions.
//!
//! Requests other than `initialize` and `ping` are rejected until the client
//! confirms the handshake with `notifications/initialized`.

use async_trait::async_trait;
use duplexmcp_protocol::jsonrpc::JsonRpcError;
use duplexmcp_protocol::types::initialization::{InitializeParams, InitializeResult};
use duplexmcp_protocol::types::{
    CallToolParams, CallToolResult, ClientCapabilities, CompleteParams, CompleteResult,
    CompletionCapabilities, Content, CreateMessageParams, CreateMessageParamsWithTools,
    CreateMessageResult, CreateMessageResultWithTools, ElicitParams, ElicitResult,
    ElicitationAction, ElicitationCompleteParams, GetPromptParams, GetPromptResult,
    ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListRootsResult, ListToolsResult,
    LoggingCapabilities, LoggingLevel, LoggingMessageParams, Prompt, PromptsCapabilities,
    ReadResourceParams, ReadResourceResult, Resource, ResourceTemplate, ResourceUpdatedParams,
    ResourcesCapabilities, ServerCapabilities, SetLevelParams, SubscribeParams, Tool,
    ToolsCapabilities, UnsubscribeParams,
};
use duplexmcp_protocol::{
    Implementation, LATEST_PROTOCOL_VERSION, ProtocolError, methods, negotiate_protocol_version,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::context::{BoxError, RequestContext};
use crate::error::{SessionError, SessionResult};
use crate::features::{DEFAULT_PAGE_SIZE, FeatureRegistry};
use crate::middleware::Middleware;
use crate::session::{self, Dispatcher, SessionConfig, SessionHandle};
use crate::store::{MemorySessionStore, SessionState, SessionStore};
use crate::transport::Transport;

/// Handles a `tools/call` for one registered tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool. A returned error becomes an `isError` result, not a
    /// protocol error.
    async fn call(
        &self,
        ctx: RequestContext,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult, BoxError>;
}

/// Handles a `prompts/get` for one registered prompt.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Expand the prompt.
    async fn get(
        &self,
        ctx: RequestContext,
        params: GetPromptParams,
    ) -> Result<GetPromptResult, BoxError>;
}

/// Handles a `resources/read` for one registered resource (or, as the
/// server-wide fallback, for template-matched URIs).
#[async_trait]
pub trait ReadResourceHandler: Send + Sync {
    /// Read the resource.
    async fn read(
        &self,
        ctx: RequestContext,
        params: ReadResourceParams,
    ) -> Result<ReadResourceResult, BoxError>;
}

/// Handles `completion/complete`.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    /// Produce completion suggestions.
    async fn complete(
        &self,
        ctx: RequestContext,
        params: CompleteParams,
    ) -> Result<CompleteResult, BoxError>;
}

struct FnToolHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnToolHandler<F>
where
    F: Fn(RequestContext, Option<serde_json::Map<String, Value>>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<CallToolResult, BoxError>> + Send,
{
    async fn call(
        &self,
        ctx: RequestContext,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult, BoxError> {
        (self.0)(ctx, arguments).await
    }
}

/// Wrap an async closure as a [`ToolHandler`].
pub fn tool_handler<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(RequestContext, Option<serde_json::Map<String, Value>>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<CallToolResult, BoxError>> + Send + 'static,
{
    Arc::new(FnToolHandler(f))
}

struct FnPromptHandler<F>(F);

#[async_trait]
impl<F, Fut> PromptHandler for FnPromptHandler<F>
where
    F: Fn(RequestContext, GetPromptParams) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<GetPromptResult, BoxError>> + Send,
{
    async fn get(
        &self,
        ctx: RequestContext,
        params: GetPromptParams,
    ) -> Result<GetPromptResult, BoxError> {
        (self.0)(ctx, params).await
    }
}

/// Wrap an async closure as a [`PromptHandler`].
pub fn prompt_handler<F, Fut>(f: F) -> Arc<dyn PromptHandler>
where
    F: Fn(RequestContext, GetPromptParams) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<GetPromptResult, BoxError>> + Send + 'static,
{
    Arc::new(FnPromptHandler(f))
}

struct FnReadResourceHandler<F>(F);

#[async_trait]
impl<F, Fut> ReadResourceHandler for FnReadResourceHandler<F>
where
    F: Fn(RequestContext, ReadResourceParams) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<ReadResourceResult, BoxError>> + Send,
{
    async fn read(
        &self,
        ctx: RequestContext,
        params: ReadResourceParams,
    ) -> Result<ReadResourceResult, BoxError> {
        (self.0)(ctx, params).await
    }
}

/// Wrap an async closure as a [`ReadResourceHandler`].
pub fn resource_handler<F, Fut>(f: F) -> Arc<dyn ReadResourceHandler>
where
    F: Fn(RequestContext, ReadResourceParams) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<ReadResourceResult, BoxError>> + Send + 'static,
{
    Arc::new(FnReadResourceHandler(f))
}

#[derive(Clone)]
struct ToolEntry {
    tool: Tool,
    handler: Arc<dyn ToolHandler>,
    input_validator: Option<Arc<jsonschema::Validator>>,
    output_validator: Option<Arc<jsonschema::Validator>>,
}

#[derive(Clone)]
struct PromptEntry {
    prompt: Prompt,
    handler: Arc<dyn PromptHandler>,
}

#[derive(Clone)]
struct ResourceEntry {
    resource: Resource,
    handler: Arc<dyn ReadResourceHandler>,
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerOptions {
    /// Page size for feature list operations.
    pub page_size: usize,
    /// Debounce window for list-changed notifications.
    pub notification_delay: Duration,
    /// Keepalive ping interval; zero disables keepalive.
    pub keepalive: Duration,
    /// Usage guidance returned from `initialize`.
    pub instructions: Option<String>,
    /// Session-state persistence backend; in-memory when unset.
    pub session_store: Option<Arc<dyn SessionStore>>,
    /// Fallback read handler for URIs not in the resource catalog
    /// (template-matched reads).
    pub read_fallback: Option<Arc<dyn ReadResourceHandler>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            notification_delay: Duration::from_millis(10),
            keepalive: Duration::ZERO,
            instructions: None,
            session_store: None,
            read_fallback: None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FeatureKind {
    Tools,
    Prompts,
    Resources,
}

struct ServerInner {
    info: Implementation,
    options: ServerOptions,
    store: Arc<dyn SessionStore>,
    tools: FeatureRegistry<ToolEntry>,
    prompts: FeatureRegistry<PromptEntry>,
    resources: FeatureRegistry<ResourceEntry>,
    templates: FeatureRegistry<ResourceTemplate>,
    completion: RwLock<Option<Arc<dyn CompletionHandler>>>,
    sending_middleware: Mutex<Vec<Arc<dyn Middleware>>>,
    receiving_middleware: Mutex<Vec<Arc<dyn Middleware>>>,
    sessions: Mutex<Vec<(SessionHandle, Arc<ServerSessionState>)>>,
    tools_timer: AtomicBool,
    prompts_timer: AtomicBool,
    resources_timer: AtomicBool,
}

/// An MCP server: feature catalogs plus any number of live sessions.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Create a server with the given identity.
    pub fn new(name: impl Into<String>, version: impl Into<String>, options: ServerOptions) -> Self {
        let store = options
            .session_store
            .clone()
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new()));
        Self {
            inner: Arc::new(ServerInner {
                info: Implementation::new(name, version),
                options,
                store,
                tools: FeatureRegistry::new(),
                prompts: FeatureRegistry::new(),
                resources: FeatureRegistry::new(),
                templates: FeatureRegistry::new(),
                completion: RwLock::new(None),
                sending_middleware: Mutex::new(Vec::new()),
                receiving_middleware: Mutex::new(Vec::new()),
                sessions: Mutex::new(Vec::new()),
                tools_timer: AtomicBool::new(false),
                prompts_timer: AtomicBool::new(false),
                resources_timer: AtomicBool::new(false),
            }),
        }
    }

    /// Register (or replace) a tool.
    pub fn add_tool(&self, tool: Tool, handler: Arc<dyn ToolHandler>) {
        let input_validator = compile_schema(&tool.input_schema.to_value(), &tool.name);
        let output_validator = tool
            .output_schema
            .as_ref()
            .and_then(|s| compile_schema(&s.to_value(), &tool.name));
        let name = tool.name.clone();
        self.inner.tools.add(
            name,
            ToolEntry {
                tool,
                handler,
                input_validator,
                output_validator,
            },
        );
        self.schedule_list_changed(FeatureKind::Tools);
    }

    /// Remove tools by name; unknown names are ignored.
    pub fn remove_tools<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.inner.tools.remove(names) {
            self.schedule_list_changed(FeatureKind::Tools);
        }
    }

    /// Register (or replace) a prompt.
    pub fn add_prompt(&self, prompt: Prompt, handler: Arc<dyn PromptHandler>) {
        let name = prompt.name.clone();
        self.inner.prompts.add(name, PromptEntry { prompt, handler });
        self.schedule_list_changed(FeatureKind::Prompts);
    }

    /// Remove prompts by name; unknown names are ignored.
    pub fn remove_prompts<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.inner.prompts.remove(names) {
            self.schedule_list_changed(FeatureKind::Prompts);
        }
    }

    /// Register (or replace) a resource, keyed by URI.
    pub fn add_resource(&self, resource: Resource, handler: Arc<dyn ReadResourceHandler>) {
        let uri = resource.uri.clone();
        self.inner
            .resources
            .add(uri, ResourceEntry { resource, handler });
        self.schedule_list_changed(FeatureKind::Resources);
    }

    /// Remove resources by URI; unknown URIs are ignored.
    pub fn remove_resources<I, S>(&self, uris: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.inner.resources.remove(uris) {
            self.schedule_list_changed(FeatureKind::Resources);
        }
    }

    /// Register (or replace) a resource template, keyed by URI template.
    pub fn add_resource_template(&self, template: ResourceTemplate) {
        let key = template.uri_template.clone();
        self.inner.templates.add(key, template);
        self.schedule_list_changed(FeatureKind::Resources);
    }

    /// Remove resource templates by URI template; unknown ones are ignored.
    pub fn remove_resource_templates<I, S>(&self, uri_templates: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.inner.templates.remove(uri_templates) {
            self.schedule_list_changed(FeatureKind::Resources);
        }
    }

    /// Install the completion handler and advertise the capability.
    pub fn set_completion_handler(&self, handler: Arc<dyn CompletionHandler>) {
        *self.inner.completion.write() = Some(handler);
    }

    /// Append a middleware to the sending chain (outermost first).
    pub fn add_sending_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.inner.sending_middleware.lock().push(middleware);
    }

    /// Append a middleware to the receiving chain (outermost first).
    pub fn add_receiving_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.inner.receiving_middleware.lock().push(middleware);
    }

    /// The capabilities this server advertises.
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            experimental: None,
            logging: Some(LoggingCapabilities {}),
            completions: self
                .inner
                .completion
                .read()
                .as_ref()
                .map(|_| CompletionCapabilities {}),
            prompts: Some(PromptsCapabilities {
                list_changed: Some(true),
            }),
            resources: Some(ResourcesCapabilities {
                subscribe: Some(true),
                list_changed: Some(true),
            }),
            tools: Some(ToolsCapabilities {
                list_changed: Some(true),
            }),
        }
    }

    /// Notify every session subscribed to `uri` that the resource changed.
    pub async fn notify_resource_updated(&self, uri: impl Into<String>) {
        let uri = uri.into();
        let params = ResourceUpdatedParams {
            uri: uri.clone(),
            meta: None,
        };
        let Ok(params) = serde_json::to_value(&params) else {
            return;
        };
        for (handle, state) in self.ready_sessions() {
            if state.subscriptions.lock().contains(&uri) {
                let _ = handle
                    .notify(methods::NOTIFICATION_RESOURCES_UPDATED, Some(params.clone()))
                    .await;
            }
        }
    }

    /// Bind one connection and serve it.
    pub async fn connect(&self, transport: impl Transport + 'static) -> SessionResult<ServerSession> {
        let conn = Box::new(transport).connect().await?;
        let session_id = conn
            .session_id()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let state = Arc::new(ServerSessionState {
            session_id: session_id.clone(),
            phase: RwLock::new(InitPhase::Uninitialized),
            client_capabilities: RwLock::new(None),
            log_level: RwLock::new(None),
            subscriptions: Mutex::new(HashSet::new()),
        });

        // Resume a persisted session: a stored initialize means the handshake
        // already completed in a previous process.
        if let Ok(persisted) = self.inner.store.load(&session_id).await {
            if let Some(params) = persisted.initialize_params {
                *state.phase.write() = InitPhase::Ready;
                *state.client_capabilities.write() = Some(params.capabilities);
            }
            *state.log_level.write() = persisted.log_level;
        }

        let dispatcher = Arc::new(ServerDispatcher {
            server: self.inner.clone(),
            state: state.clone(),
        });
        let handle = session::start(
            conn,
            SessionConfig {
                dispatcher,
                sending_middleware: self.inner.sending_middleware.lock().clone(),
                receiving_middleware: self.inner.receiving_middleware.lock().clone(),
                keepalive: self.inner.options.keepalive,
                session_id: Some(session_id.clone()),
            },
        );

        self.inner
            .sessions
            .lock()
            .push((handle.clone(), state.clone()));

        // Reap the session record once the reader finishes.
        let server = self.inner.clone();
        let reap_handle = handle.clone();
        let reap_id = session_id;
        tokio::spawn(async move {
            let _ = reap_handle.wait().await;
            server
                .sessions
                .lock()
                .retain(|(h, _)| h.session_id() != reap_handle.session_id());
            let _ = server.store.delete(&reap_id).await;
        });

        Ok(ServerSession { handle, state })
    }

    fn ready_sessions(&self) -> Vec<(SessionHandle, Arc<ServerSessionState>)> {
        self.inner
            .sessions
            .lock()
            .iter()
            .filter(|(_, s)| *s.phase.read() == InitPhase::Ready)
            .cloned()
            .collect()
    }

    fn schedule_list_changed(&self, kind: FeatureKind) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // No runtime, no sessions: the change is observable via the next
            // list call, so just drop the pending notification.
            let _ = self.registry_dirty(kind);
            return;
        };
        if self.timer_flag(kind).swap(true, Ordering::SeqCst) {
            return;
        }
        let server = self.clone();
        let delay = self.inner.options.notification_delay;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            server.timer_flag(kind).store(false, Ordering::SeqCst);
            if !server.registry_dirty(kind) {
                return;
            }
            let method = match kind {
                FeatureKind::Tools => methods::NOTIFICATION_TOOLS_LIST_CHANGED,
                FeatureKind::Prompts => methods::NOTIFICATION_PROMPTS_LIST_CHANGED,
                FeatureKind::Resources => methods::NOTIFICATION_RESOURCES_LIST_CHANGED,
            };
            for (handle, _) in server.ready_sessions() {
                if let Err(err) = handle.notify(method, None).await {
                    debug!(error = %err, method, "failed to send list-changed notification");
                }
            }
        });
    }

    fn timer_flag(&self, kind: FeatureKind) -> &AtomicBool {
        match kind {
            FeatureKind::Tools => &self.inner.tools_timer,
            FeatureKind::Prompts => &self.inner.prompts_timer,
            FeatureKind::Resources => &self.inner.resources_timer,
        }
    }

    fn registry_dirty(&self, kind: FeatureKind) -> bool {
        match kind {
            FeatureKind::Tools => self.inner.tools.take_dirty(),
            FeatureKind::Prompts => self.inner.prompts.take_dirty(),
            FeatureKind::Resources => {
                // Resources and templates share one notification method.
                let resources = self.inner.resources.take_dirty();
                let templates = self.inner.templates.take_dirty();
                resources || templates
            }
        }
    }
}

fn compile_schema(schema: &Value, tool: &str) -> Option<Arc<jsonschema::Validator>> {
    match jsonschema::validator_for(schema) {
        Ok(validator) => Some(Arc::new(validator)),
        Err(err) => {
            warn!(tool, error = %err, "invalid JSON schema, skipping validation");
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InitPhase {
    Uninitialized,
    Initializing,
    Ready,
}

struct ServerSessionState {
    session_id: String,
    phase: RwLock<InitPhase>,
    client_capabilities: RwLock<Option<ClientCapabilities>>,
    log_level: RwLock<Option<LoggingLevel>>,
    subscriptions: Mutex<HashSet<String>>,
}

/// One live server-side session.
#[derive(Clone)]
pub struct ServerSession {
    handle: SessionHandle,
    state: Arc<ServerSessionState>,
}

impl ServerSession {
    /// The session's opaque identifier.
    pub fn session_id(&self) -> String {
        self.state.session_id.clone()
    }

    /// The raw session handle.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// The capabilities the client advertised, once initialized.
    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.state.client_capabilities.read().clone()
    }

    /// Liveness check.
    pub async fn ping(&self) -> SessionResult<()> {
        self.handle.ping().await
    }

    /// Ask the client's LLM for a message.
    pub async fn create_message(
        &self,
        params: CreateMessageParams,
    ) -> SessionResult<CreateMessageResult> {
        let value = self
            .handle
            .request(methods::SAMPLING_CREATE_MESSAGE, Some(to_value(&params)?))
            .await?;
        from_value(value)
    }

    /// Ask the client's LLM for a message with tools available.
    pub async fn create_message_with_tools(
        &self,
        params: CreateMessageParamsWithTools,
    ) -> SessionResult<CreateMessageResultWithTools> {
        for message in &params.messages {
            message.validate()?;
        }
        let value = self
            .handle
            .request(
                methods::SAMPLING_CREATE_MESSAGE_WITH_TOOLS,
                Some(to_value(&params)?),
            )
            .await?;
        let result: CreateMessageResultWithTools = from_value(value)?;
        result.validate()?;
        Ok(result)
    }

    /// Request structured user input from the client.
    ///
    /// The requested schema is validated here, before transmission; accepted
    /// content is validated against it on receipt.
    pub async fn elicit(&self, params: ElicitParams) -> SessionResult<ElicitResult> {
        params.validate()?;
        let schema = params.requested_schema.clone();
        let value = self
            .handle
            .request(methods::ELICITATION_CREATE, Some(to_value(&params)?))
            .await?;
        let result: ElicitResult = from_value(value)?;
        if result.action == ElicitationAction::Accept
            && let Some(schema) = &schema
        {
            let empty = serde_json::Map::new();
            schema.validate_content(result.content.as_ref().unwrap_or(&empty))?;
        }
        Ok(result)
    }

    /// List the client's filesystem roots.
    pub async fn list_roots(&self) -> SessionResult<ListRootsResult> {
        let value = self.handle.request(methods::ROOTS_LIST, None).await?;
        from_value(value)
    }

    /// Signal that a URL-mode elicitation finished out of band.
    pub async fn notify_elicitation_complete(
        &self,
        elicitation_id: impl Into<String>,
    ) -> SessionResult<()> {
        let params = ElicitationCompleteParams {
            elicitation_id: elicitation_id.into(),
            meta: None,
        };
        self.handle
            .notify(
                methods::NOTIFICATION_ELICITATION_COMPLETE,
                Some(to_value(&params)?),
            )
            .await
    }

    /// Send a log message, honoring the client's chosen level.
    ///
    /// Messages are dropped until the client selects a level via
    /// `logging/setLevel`.
    pub async fn log(
        &self,
        level: LoggingLevel,
        logger: Option<String>,
        data: Value,
    ) -> SessionResult<()> {
        let threshold = *self.state.log_level.read();
        let Some(threshold) = threshold else {
            return Ok(());
        };
        if !threshold.allows(level) {
            return Ok(());
        }
        let params = LoggingMessageParams {
            level,
            logger,
            data,
            meta: None,
        };
        self.handle
            .notify(methods::NOTIFICATION_MESSAGE, Some(to_value(&params)?))
            .await
    }

    /// Close the session.
    pub async fn close(&self) -> SessionResult<()> {
        self.handle.close().await
    }

    /// Await session termination; `None` after a local close.
    pub async fn wait(&self) -> Option<SessionError> {
        self.handle.wait().await
    }
}

struct ServerDispatcher {
    server: Arc<ServerInner>,
    state: Arc<ServerSessionState>,
}

#[async_trait]
impl Dispatcher for ServerDispatcher {
    async fn dispatch(&self, ctx: RequestContext, params: Option<Value>) -> SessionResult<Value> {
        let method = ctx.method().to_string();
        let phase = *self.state.phase.read();
        if phase != InitPhase::Ready
            && method != methods::INITIALIZE
            && method != methods::PING
        {
            return Err(SessionError::InvalidDuringInitialization(method));
        }

        match method.as_str() {
            methods::INITIALIZE => self.initialize(params).await,
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => self.list_tools(params),
            methods::TOOLS_CALL => self.call_tool(ctx, params).await,
            methods::PROMPTS_LIST => self.list_prompts(params),
            methods::PROMPTS_GET => self.get_prompt(ctx, params).await,
            methods::RESOURCES_LIST => self.list_resources(params),
            methods::RESOURCES_TEMPLATES_LIST => self.list_templates(params),
            methods::RESOURCES_READ => self.read_resource(ctx, params).await,
            methods::RESOURCES_SUBSCRIBE => self.subscribe(params),
            methods::RESOURCES_UNSUBSCRIBE => self.unsubscribe(params),
            methods::LOGGING_SET_LEVEL => self.set_level(params).await,
            methods::COMPLETION_COMPLETE => self.complete(ctx, params).await,
            other => Err(SessionError::Protocol(ProtocolError::MethodNotFound(
                other.to_string(),
            ))),
        }
    }

    async fn notification(&self, _session: SessionHandle, method: &str, _params: Option<Value>) {
        match method {
            methods::NOTIFICATION_INITIALIZED => {
                *self.state.phase.write() = InitPhase::Ready;
            }
            methods::NOTIFICATION_ROOTS_LIST_CHANGED => {
                debug!(session_id = %self.state.session_id, "client roots changed");
            }
            other => {
                debug!(method = other, "ignoring unhandled notification");
            }
        }
    }
}

impl ServerDispatcher {
    async fn initialize(&self, params: Option<Value>) -> SessionResult<Value> {
        let params: InitializeParams = parse_params(params)?;
        {
            let mut phase = self.state.phase.write();
            if *phase == InitPhase::Uninitialized {
                *phase = InitPhase::Initializing;
            }
        }
        *self.state.client_capabilities.write() = Some(params.capabilities.clone());

        let persisted = SessionState {
            initialize_params: Some(params.clone()),
            log_level: *self.state.log_level.read(),
        };
        if let Err(err) = self
            .server
            .store
            .store(&self.state.session_id, persisted)
            .await
        {
            warn!(error = %err, "failed to persist session state");
        }

        let version = if params.protocol_version.is_empty() {
            LATEST_PROTOCOL_VERSION
        } else {
            negotiate_protocol_version(&params.protocol_version)
        };
        let result = InitializeResult {
            protocol_version: version.to_string(),
            capabilities: Server {
                inner: self.server.clone(),
            }
            .capabilities(),
            server_info: self.server.info.clone(),
            instructions: self.server.options.instructions.clone(),
            meta: None,
        };
        to_value(&result)
    }

    fn list_tools(&self, params: Option<Value>) -> SessionResult<Value> {
        let cursor = parse_cursor(params)?;
        let (entries, next_cursor) = self
            .server
            .tools
            .list(cursor.as_deref(), self.server.options.page_size)?;
        to_value(&ListToolsResult {
            tools: entries.into_iter().map(|e| e.tool).collect(),
            next_cursor,
            meta: None,
        })
    }

    async fn call_tool(&self, ctx: RequestContext, params: Option<Value>) -> SessionResult<Value> {
        let params: CallToolParams = parse_params(params)?;
        let Some(entry) = self.server.tools.get(&params.name) else {
            return Err(SessionError::Protocol(ProtocolError::InvalidParams(
                format!("tool not found: {}", params.name),
            )));
        };

        if let Some(validator) = &entry.input_validator {
            let arguments = params
                .arguments
                .clone()
                .map(Value::Object)
                .unwrap_or_else(|| json!({}));
            if let Err(error) = validator.validate(&arguments) {
                return Err(SessionError::Protocol(ProtocolError::InvalidParams(
                    format!("tool {} arguments invalid: {error}", params.name),
                )));
            }
        }

        match entry.handler.call(ctx.clone(), params.arguments).await {
            Ok(mut result) => {
                if let Some(structured) = &result.structured_content {
                    if let Some(validator) = &entry.output_validator
                        && let Err(error) = validator.validate(structured)
                    {
                        return Err(SessionError::Handler(format!(
                            "tool {} structured output invalid: {error}",
                            params.name
                        )));
                    }
                    // A structured-output tool that left content empty still
                    // owes the model something readable.
                    if result.content.is_empty() {
                        let text = serde_json::to_string(structured)
                            .map_err(|e| SessionError::Handler(e.to_string()))?;
                        result.content = vec![Content::text(text)];
                    }
                }
                to_value(&result)
            }
            Err(error) => {
                let error: Arc<dyn std::error::Error + Send + Sync> = Arc::from(error);
                ctx.set_tool_error(error.clone());
                to_value(&CallToolResult::from_error(error))
            }
        }
    }

    fn list_prompts(&self, params: Option<Value>) -> SessionResult<Value> {
        let cursor = parse_cursor(params)?;
        let (entries, next_cursor) = self
            .server
            .prompts
            .list(cursor.as_deref(), self.server.options.page_size)?;
        to_value(&ListPromptsResult {
            prompts: entries.into_iter().map(|e| e.prompt).collect(),
            next_cursor,
            meta: None,
        })
    }

    async fn get_prompt(&self, ctx: RequestContext, params: Option<Value>) -> SessionResult<Value> {
        let params: GetPromptParams = parse_params(params)?;
        let Some(entry) = self.server.prompts.get(&params.name) else {
            return Err(SessionError::Protocol(ProtocolError::InvalidParams(
                format!("prompt not found: {}", params.name),
            )));
        };
        let result = entry
            .handler
            .get(ctx, params)
            .await
            .map_err(|e| SessionError::Handler(e.to_string()))?;
        to_value(&result)
    }

    fn list_resources(&self, params: Option<Value>) -> SessionResult<Value> {
        let cursor = parse_cursor(params)?;
        let (entries, next_cursor) = self
            .server
            .resources
            .list(cursor.as_deref(), self.server.options.page_size)?;
        to_value(&ListResourcesResult {
            resources: entries.into_iter().map(|e| e.resource).collect(),
            next_cursor,
            meta: None,
        })
    }

    fn list_templates(&self, params: Option<Value>) -> SessionResult<Value> {
        let cursor = parse_cursor(params)?;
        let (entries, next_cursor) = self
            .server
            .templates
            .list(cursor.as_deref(), self.server.options.page_size)?;
        to_value(&ListResourceTemplatesResult {
            resource_templates: entries,
            next_cursor,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        ctx: RequestContext,
        params: Option<Value>,
    ) -> SessionResult<Value> {
        let params: ReadResourceParams = parse_params(params)?;
        let handler = match self.server.resources.get(&params.uri) {
            Some(entry) => entry.handler,
            None => match &self.server.options.read_fallback {
                Some(fallback) => fallback.clone(),
                None => {
                    return Err(SessionError::Protocol(ProtocolError::InvalidParams(
                        format!("resource not found: {}", params.uri),
                    )));
                }
            },
        };
        let result = handler
            .read(ctx, params)
            .await
            .map_err(|e| SessionError::Handler(e.to_string()))?;
        to_value(&result)
    }

    fn subscribe(&self, params: Option<Value>) -> SessionResult<Value> {
        let params: SubscribeParams = parse_params(params)?;
        self.state.subscriptions.lock().insert(params.uri);
        Ok(json!({}))
    }

    fn unsubscribe(&self, params: Option<Value>) -> SessionResult<Value> {
        let params: UnsubscribeParams = parse_params(params)?;
        self.state.subscriptions.lock().remove(&params.uri);
        Ok(json!({}))
    }

    async fn set_level(&self, params: Option<Value>) -> SessionResult<Value> {
        let params: SetLevelParams = parse_params(params)?;
        *self.state.log_level.write() = Some(params.level);

        let mut persisted = self
            .server
            .store
            .load(&self.state.session_id)
            .await
            .unwrap_or_default();
        persisted.log_level = Some(params.level);
        if let Err(err) = self
            .server
            .store
            .store(&self.state.session_id, persisted)
            .await
        {
            warn!(error = %err, "failed to persist log level");
        }
        Ok(json!({}))
    }

    async fn complete(&self, ctx: RequestContext, params: Option<Value>) -> SessionResult<Value> {
        let handler = self.server.completion.read().clone();
        let Some(handler) = handler else {
            return Err(SessionError::Rpc(JsonRpcError::new(
                duplexmcp_protocol::error_codes::METHOD_NOT_FOUND,
                "completion/complete unsupported: server has no completion handler",
            )));
        };
        let params: CompleteParams = parse_params(params)?;
        let result = handler
            .complete(ctx, params)
            .await
            .map_err(|e| SessionError::Handler(e.to_string()))?;
        to_value(&result)
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> SessionResult<T> {
    serde_json::from_value(params.unwrap_or(Value::Object(serde_json::Map::new())))
        .map_err(|e| SessionError::Protocol(ProtocolError::InvalidParams(e.to_string())))
}

fn parse_cursor(params: Option<Value>) -> SessionResult<Option<String>> {
    let Some(params) = params else {
        return Ok(None);
    };
    Ok(params
        .get("cursor")
        .and_then(Value::as_str)
        .map(str::to_string))
}

fn to_value<T: serde::Serialize>(value: &T) -> SessionResult<Value> {
    serde_json::to_value(value).map_err(|e| SessionError::Handler(e.to_string()))
}

fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> SessionResult<T> {
    serde_json::from_value(value)
        .map_err(|e| SessionError::Protocol(ProtocolError::InvalidParams(e.to_string())))
}
