//! Typed params and results for every MCP method.
//!
//! Modules mirror the protocol's feature areas. All wire names are camelCase
//! via serde renames; optional fields use `skip_serializing_if` so absent
//! values never serialize as JSON `null`.

pub mod capabilities;
pub mod completion;
pub mod content;
pub mod core;
pub mod elicitation;
pub mod initialization;
pub mod logging;
pub mod notifications;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tools;

pub use capabilities::{
    ClientCapabilities, CompletionCapabilities, ElicitationCapabilities, LoggingCapabilities,
    PromptsCapabilities, ResourcesCapabilities, RootsCapabilities, SamplingCapabilities,
    ServerCapabilities, ToolsCapabilities,
};
pub use completion::{
    CompleteParams, CompleteResult, Completion, CompletionArgument, CompletionReference,
};
pub use content::{
    AudioContent, Content, ContentContext, ContentList, EmbeddedResource, ImageContent,
    ResourceContents, ResourceLink, TextContent, ToolResultContent, ToolUseContent,
};
pub use core::{Annotations, Cursor, Implementation, Meta, ProgressToken, Role};
pub use elicitation::{
    ElicitParams, ElicitResult, ElicitationAction, ElicitationCompleteParams, ElicitationMode,
    ElicitationSchema,
};
pub use initialization::{InitializeParams, InitializeResult, InitializedParams};
pub use logging::{LoggingLevel, LoggingMessageParams, SetLevelParams};
pub use notifications::{CancelledParams, PingParams, ProgressParams};
pub use prompts::{
    GetPromptParams, GetPromptResult, ListPromptsParams, ListPromptsResult, Prompt, PromptArgument,
    PromptMessage,
};
pub use resources::{
    BlobResourceContents, ListResourceTemplatesParams, ListResourceTemplatesResult,
    ListResourcesParams, ListResourcesResult, ReadResourceParams, ReadResourceResult, Resource,
    ResourceTemplate, ResourceUpdatedParams, SubscribeParams, TextResourceContents,
    UnsubscribeParams,
};
pub use roots::{ListRootsParams, ListRootsResult, Root};
pub use sampling::{
    ContextInclusion, CreateMessageParams, CreateMessageParamsWithTools, CreateMessageResult,
    CreateMessageResultWithTools, ModelHint, ModelPreferences, SamplingMessage,
    SamplingMessageWithTools,
};
pub use tools::{
    CallToolParams, CallToolResult, ListToolsParams, ListToolsResult, Tool, ToolAnnotations,
    ToolInputSchema, ToolOutputSchema,
};
