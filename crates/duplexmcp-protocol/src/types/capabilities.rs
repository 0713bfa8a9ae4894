//! Capability negotiation types.
//!
//! Capabilities are nested-option objects: presence of a sub-object means the
//! peer advertises that feature; presence of a sub-capability field means the
//! sub-feature is supported.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Client capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ClientCapabilities {
    /// Experimental, non-standard capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,

    /// Present if the client supports listing filesystem roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapabilities>,

    /// Present if the client supports sampling from an LLM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapabilities>,

    /// Present if the client supports elicitation from the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapabilities>,
}

/// Server capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServerCapabilities {
    /// Experimental, non-standard capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,

    /// Present if the server supports sending log messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapabilities>,

    /// Present if the server supports argument autocompletion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionCapabilities>,

    /// Present if the server offers prompt templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapabilities>,

    /// Present if the server offers readable resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapabilities>,

    /// Present if the server offers callable tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapabilities>,
}

/// Roots sub-capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RootsCapabilities {
    /// Whether the root list can change at runtime.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Sampling sub-capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SamplingCapabilities {
    /// Whether the client supports tool use during sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Map<String, serde_json::Value>>,
    /// Whether the client supports server-context inclusion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Elicitation sub-capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ElicitationCapabilities {
    /// Whether the client renders inline schema forms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<serde_json::Map<String, serde_json::Value>>,
    /// Whether the client can open external elicitation URLs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Logging capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LoggingCapabilities {}

/// Completion capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CompletionCapabilities {}

/// Prompts sub-capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PromptsCapabilities {
    /// Whether the prompt list can change at runtime.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resources sub-capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ResourcesCapabilities {
    /// Whether per-resource subscriptions are supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    /// Whether the resource list can change at runtime.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Tools sub-capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ToolsCapabilities {
    /// Whether the tool list can change at runtime.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}
