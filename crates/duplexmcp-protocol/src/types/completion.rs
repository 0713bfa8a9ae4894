//! Argument autocompletion types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::core::Meta;

/// What the completion request is about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum CompletionReference {
    /// Completing an argument of a prompt.
    #[serde(rename = "ref/prompt")]
    Prompt {
        /// Prompt name.
        name: String,
    },
    /// Completing a variable of a resource template.
    #[serde(rename = "ref/resource")]
    Resource {
        /// Resource template URI.
        uri: String,
    },
}

/// The argument being completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionArgument {
    /// Argument name.
    pub name: String,
    /// Current partial value.
    pub value: String,
}

/// Parameters of `completion/complete`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompleteParams {
    /// Target prompt or resource template.
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    /// Argument under completion.
    pub argument: CompletionArgument,
    /// Previously resolved argument values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<CompletionContext>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Already-resolved arguments, available to the completion handler.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CompletionContext {
    /// Resolved argument values keyed by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, String>>,
}

/// Completion suggestions.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Completion {
    /// Suggested values, best first (at most 100).
    pub values: Vec<String>,
    /// Total number of matches, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Whether more matches exist beyond `values`.
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// Result of `completion/complete`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompleteResult {
    /// The suggestions.
    pub completion: Completion,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}
