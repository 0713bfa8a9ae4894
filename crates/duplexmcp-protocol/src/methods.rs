//! MCP method name constants.
//!
//! One constant per protocol method so dispatch tables and tests never carry
//! string literals.

/// Initialization handshake request.
pub const INITIALIZE: &str = "initialize";
/// Client confirmation that initialization completed.
pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
/// Liveness check, valid in any session state.
pub const PING: &str = "ping";
/// Cancellation of an in-flight request.
pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";
/// Progress report tied to a progress token.
pub const NOTIFICATION_PROGRESS: &str = "notifications/progress";
/// Log message from server to client.
pub const NOTIFICATION_MESSAGE: &str = "notifications/message";
/// Adjust the minimum log level forwarded to the client.
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

/// List registered tools.
pub const TOOLS_LIST: &str = "tools/list";
/// Invoke a tool.
pub const TOOLS_CALL: &str = "tools/call";
/// Tool catalog mutated.
pub const NOTIFICATION_TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";

/// List registered prompts.
pub const PROMPTS_LIST: &str = "prompts/list";
/// Expand a prompt.
pub const PROMPTS_GET: &str = "prompts/get";
/// Prompt catalog mutated.
pub const NOTIFICATION_PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";

/// List registered resources.
pub const RESOURCES_LIST: &str = "resources/list";
/// List registered resource templates.
pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
/// Read a resource by URI.
pub const RESOURCES_READ: &str = "resources/read";
/// Subscribe to change notifications for a resource.
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
/// Drop a resource subscription.
pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
/// Resource catalog mutated.
pub const NOTIFICATION_RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
/// A subscribed resource changed.
pub const NOTIFICATION_RESOURCES_UPDATED: &str = "notifications/resources/updated";

/// List client-side filesystem roots.
pub const ROOTS_LIST: &str = "roots/list";
/// Root catalog mutated.
pub const NOTIFICATION_ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";

/// Ask the client's LLM for a message.
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
/// Ask the client's LLM for a message with tool use available.
pub const SAMPLING_CREATE_MESSAGE_WITH_TOOLS: &str = "sampling/createMessageWithTools";

/// Argument autocompletion.
pub const COMPLETION_COMPLETE: &str = "completion/complete";

/// Request structured user input from the client.
pub const ELICITATION_CREATE: &str = "elicitation/create";
/// Out-of-band completion signal for a URL-mode elicitation.
pub const NOTIFICATION_ELICITATION_COMPLETE: &str = "notifications/elicitation/complete";
