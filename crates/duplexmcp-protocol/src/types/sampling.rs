//! Sampling types: server-initiated requests for the client's LLM.
//!
//! Two flavors exist. `sampling/createMessage` carries one content block per
//! message; `sampling/createMessageWithTools` carries an array and supports
//! parallel tool use. For wire compatibility a with-tools content array of
//! length one is marshaled as a bare object (see
//! [`ContentList`](super::content::ContentList)).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::{Content, ContentContext, ContentList};
use super::core::{Meta, Role};
use super::tools::Tool;
use crate::error::{ProtocolError, ProtocolResult};

/// How much server context the client should include in the model prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContextInclusion {
    /// No server context.
    #[serde(rename = "none")]
    None,
    /// Context from the requesting server.
    #[serde(rename = "thisServer")]
    ThisServer,
    /// Context from every connected server.
    #[serde(rename = "allServers")]
    AllServers,
}

/// A model name hint.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModelHint {
    /// Substring-matched model name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Server preferences for model selection.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModelPreferences {
    /// Ordered model name hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<ModelHint>>,
    /// Priority of cost (0 to 1).
    #[serde(rename = "costPriority", skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,
    /// Priority of speed (0 to 1).
    #[serde(rename = "speedPriority", skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,
    /// Priority of intelligence (0 to 1).
    #[serde(rename = "intelligencePriority", skip_serializing_if = "Option::is_none")]
    pub intelligence_priority: Option<f64>,
}

/// A sampling message with a single content block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplingMessage {
    /// Message role.
    pub role: Role,
    /// Message content.
    pub content: Content,
}

/// A sampling message whose content is an array of blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplingMessageWithTools {
    /// Message role.
    pub role: Role,
    /// Message content blocks.
    pub content: ContentList,
}

impl SamplingMessageWithTools {
    /// Validate every block against the whitelist for this message's role.
    pub fn validate(&self) -> ProtocolResult<()> {
        let context = match self.role {
            Role::Assistant => ContentContext::SamplingAssistant,
            Role::User => ContentContext::SamplingUser,
        };
        self.content.validate_in(context)
    }
}

/// Parameters of `sampling/createMessage`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateMessageParams {
    /// Conversation so far.
    pub messages: Vec<SamplingMessage>,
    /// Model selection preferences.
    #[serde(rename = "modelPreferences", skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,
    /// System prompt the server would like used.
    #[serde(rename = "systemPrompt", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Server-context inclusion request.
    #[serde(rename = "includeContext", skip_serializing_if = "Option::is_none")]
    pub include_context: Option<ContextInclusion>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to sample.
    #[serde(rename = "maxTokens")]
    pub max_tokens: i64,
    /// Stop sequences.
    #[serde(rename = "stopSequences", skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Provider-specific metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Result of `sampling/createMessage`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateMessageResult {
    /// Role of the sampled message (always assistant).
    pub role: Role,
    /// Sampled content.
    pub content: Content,
    /// Name of the model that produced the message.
    pub model: String,
    /// Why sampling stopped.
    #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Parameters of `sampling/createMessageWithTools`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateMessageParamsWithTools {
    /// Conversation so far; each message may carry several blocks.
    pub messages: Vec<SamplingMessageWithTools>,
    /// Tools the model may invoke.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// Model selection preferences.
    #[serde(rename = "modelPreferences", skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,
    /// System prompt the server would like used.
    #[serde(rename = "systemPrompt", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Server-context inclusion request.
    #[serde(rename = "includeContext", skip_serializing_if = "Option::is_none")]
    pub include_context: Option<ContextInclusion>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to sample.
    #[serde(rename = "maxTokens")]
    pub max_tokens: i64,
    /// Stop sequences.
    #[serde(rename = "stopSequences", skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Provider-specific metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Result of `sampling/createMessageWithTools`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateMessageResultWithTools {
    /// Role of the sampled message (always assistant).
    pub role: Role,
    /// Sampled content blocks.
    pub content: ContentList,
    /// Name of the model that produced the message.
    pub model: String,
    /// Why sampling stopped.
    #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl CreateMessageResultWithTools {
    /// Validate the sampled content as an assistant message.
    ///
    /// Tool results are never legal in an assistant response.
    pub fn validate(&self) -> ProtocolResult<()> {
        self.content.validate_in(ContentContext::SamplingAssistant)
    }
}

impl CreateMessageParams {
    /// Lift singular-content params into the with-tools shape.
    pub fn into_with_tools(self) -> CreateMessageParamsWithTools {
        CreateMessageParamsWithTools {
            messages: self
                .messages
                .into_iter()
                .map(|m| SamplingMessageWithTools {
                    role: m.role,
                    content: ContentList::single(m.content),
                })
                .collect(),
            tools: None,
            model_preferences: self.model_preferences,
            system_prompt: self.system_prompt,
            include_context: self.include_context,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop_sequences: self.stop_sequences,
            metadata: self.metadata,
            meta: self.meta,
        }
    }
}

impl CreateMessageResultWithTools {
    /// Project a with-tools result onto the singular-content shape.
    ///
    /// Fails when the result carries more than one block, since the base
    /// method cannot express that; callers should use
    /// `sampling/createMessageWithTools` instead.
    pub fn into_single(mut self) -> ProtocolResult<CreateMessageResult> {
        if self.content.0.len() != 1 {
            return Err(ProtocolError::InvalidParams(format!(
                "sampling result has {} content blocks; only sampling/createMessageWithTools \
                 supports multi-block messages",
                self.content.0.len()
            )));
        }
        Ok(CreateMessageResult {
            role: self.role,
            content: self.content.0.remove(0),
            model: self.model,
            stop_reason: self.stop_reason,
            meta: self.meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_params(messages: Vec<SamplingMessage>) -> CreateMessageParams {
        CreateMessageParams {
            messages,
            model_preferences: None,
            system_prompt: None,
            include_context: None,
            temperature: None,
            max_tokens: 256,
            stop_sequences: None,
            metadata: None,
            meta: None,
        }
    }

    #[test]
    fn test_singleton_with_tools_message_marshals_as_object() {
        let message = SamplingMessageWithTools {
            role: Role::User,
            content: ContentList::single(Content::text("hi")),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert!(value["content"].is_object());
    }

    #[test]
    fn test_into_with_tools_lifts_each_message() {
        let params = base_params(vec![SamplingMessage {
            role: Role::User,
            content: Content::text("question"),
        }]);
        let lifted = params.into_with_tools();
        assert_eq!(lifted.messages.len(), 1);
        assert_eq!(lifted.messages[0].content.0.len(), 1);
        assert!(lifted.tools.is_none());
    }

    #[test]
    fn test_into_single_rejects_multi_block() {
        let result = CreateMessageResultWithTools {
            role: Role::Assistant,
            content: ContentList(vec![Content::text("a"), Content::text("b")]),
            model: "m".into(),
            stop_reason: None,
            meta: None,
        };
        let err = result.into_single().unwrap_err();
        assert!(err.to_string().contains("sampling/createMessageWithTools"));
    }

    #[test]
    fn test_assistant_result_rejects_tool_result_content() {
        let result = CreateMessageResultWithTools {
            role: Role::Assistant,
            content: ContentList(vec![Content::ToolResult(
                super::super::content::ToolResultContent {
                    tool_use_id: "x".into(),
                    content: ContentList::single(Content::text("out")),
                    is_error: None,
                    meta: None,
                },
            )]),
            model: "m".into(),
            stop_reason: None,
            meta: None,
        };
        assert!(result.validate().is_err());
    }

    #[test]
    fn test_context_inclusion_wire_names() {
        assert_eq!(
            serde_json::to_value(ContextInclusion::ThisServer).unwrap(),
            json!("thisServer")
        );
    }
}
