//! Polymorphic message content.
//!
//! A [`Content`] value is tagged by its `type` field. Which variants are
//! legal depends on where the value appears: tool results accept the five
//! data-bearing variants, sampling assistant messages accept `tool_use`, and
//! sampling user messages additionally accept `tool_result`. Decoding runs
//! through [`Content::decode_in`], which enforces the whitelist for the given
//! context, recursing into nested tool-result content.
//!
//! The `text` and `data` fields of text/image/audio content are always
//! serialized, even when empty: the protocol treats their absence as
//! malformed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::core::{Annotations, Meta};
use crate::error::{ProtocolError, ProtocolResult};

/// A single content block, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Content {
    /// Plain text.
    #[serde(rename = "text")]
    Text(TextContent),
    /// Base64-encoded image.
    #[serde(rename = "image")]
    Image(ImageContent),
    /// Base64-encoded audio.
    #[serde(rename = "audio")]
    Audio(AudioContent),
    /// Reference to a resource by URI.
    #[serde(rename = "resource_link")]
    ResourceLink(ResourceLink),
    /// Inlined resource contents.
    #[serde(rename = "resource")]
    Resource(EmbeddedResource),
    /// Model-requested tool invocation (sampling only).
    #[serde(rename = "tool_use")]
    ToolUse(ToolUseContent),
    /// Result of a tool invocation (sampling user messages only).
    #[serde(rename = "tool_result")]
    ToolResult(ToolResultContent),
}

/// Where a content value appears, selecting the permitted variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentContext {
    /// Inside a tool call result (and nested tool-result content).
    ToolResult,
    /// Inside a sampling message attributed to the assistant.
    SamplingAssistant,
    /// Inside a sampling message attributed to the user.
    SamplingUser,
}

impl Content {
    /// Convenience constructor for text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextContent::new(text))
    }

    /// The wire-level `type` tag of this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Audio(_) => "audio",
            Self::ResourceLink(_) => "resource_link",
            Self::Resource(_) => "resource",
            Self::ToolUse(_) => "tool_use",
            Self::ToolResult(_) => "tool_result",
        }
    }

    /// Whether this variant is permitted in the given context.
    pub fn allowed_in(&self, context: ContentContext) -> bool {
        match context {
            ContentContext::ToolResult => !matches!(self, Self::ToolUse(_) | Self::ToolResult(_)),
            ContentContext::SamplingAssistant => matches!(
                self,
                Self::Text(_) | Self::Image(_) | Self::Audio(_) | Self::ToolUse(_)
            ),
            ContentContext::SamplingUser => matches!(
                self,
                Self::Text(_)
                    | Self::Image(_)
                    | Self::Audio(_)
                    | Self::ToolUse(_)
                    | Self::ToolResult(_)
            ),
        }
    }

    /// Validate this value (and any nested tool-result content) for a context.
    pub fn validate_in(&self, context: ContentContext) -> ProtocolResult<()> {
        if !self.allowed_in(context) {
            return Err(ProtocolError::InvalidParams(format!(
                "content type {:?} not permitted in {context:?} context",
                self.kind()
            )));
        }
        if let Self::ToolResult(result) = self {
            for nested in &result.content.0 {
                nested.validate_in(ContentContext::ToolResult)?;
            }
        }
        Ok(())
    }

    /// Decode a content value, enforcing the context whitelist.
    pub fn decode_in(value: Value, context: ContentContext) -> ProtocolResult<Self> {
        let content: Self = serde_json::from_value(value)
            .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?;
        content.validate_in(context)?;
        Ok(content)
    }
}

/// One-or-many content blocks.
///
/// Some spec revisions allow these fields to be either a single object or an
/// array; the decoder accepts both and the encoder emits a bare object for a
/// singleton list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentList(pub Vec<Content>);

impl ContentList {
    /// Wrap a single content block.
    pub fn single(content: Content) -> Self {
        Self(vec![content])
    }

    /// Validate every member for a context.
    pub fn validate_in(&self, context: ContentContext) -> ProtocolResult<()> {
        for content in &self.0 {
            content.validate_in(context)?;
        }
        Ok(())
    }
}

impl From<Vec<Content>> for ContentList {
    fn from(items: Vec<Content>) -> Self {
        Self(items)
    }
}

impl Serialize for ContentList {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.0.len() == 1 {
            self.0[0].serialize(serializer)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ContentList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Array(items) => {
                let mut contents = Vec::with_capacity(items.len());
                for item in items {
                    contents.push(serde_json::from_value(item).map_err(serde::de::Error::custom)?);
                }
                Ok(Self(contents))
            }
            object @ Value::Object(_) => {
                let content = serde_json::from_value(object).map_err(serde::de::Error::custom)?;
                Ok(Self(vec![content]))
            }
            other => Err(serde::de::Error::custom(format!(
                "content must be an object or array, got {other}"
            ))),
        }
    }
}

/// Plain text content. The `text` field is serialized even when empty.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TextContent {
    /// The text.
    pub text: String,
    /// Optional display hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl TextContent {
    /// Create text content.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            annotations: None,
            meta: None,
        }
    }
}

/// Base64-encoded image content. The `data` field is serialized even when empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageContent {
    /// Base64-encoded image bytes.
    pub data: String,
    /// Image MIME type.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Optional display hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Base64-encoded audio content. The `data` field is serialized even when empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioContent {
    /// Base64-encoded audio bytes.
    pub data: String,
    /// Audio MIME type.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Optional display hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Reference to a resource by URI without inlining its contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceLink {
    /// Resource name (programmatic identifier).
    pub name: String,
    /// Display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Resource URI.
    pub uri: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type, if known.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Size of the raw contents in bytes, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Optional display hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Resource contents inlined into a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedResource {
    /// The inlined contents (text or binary).
    pub resource: ResourceContents,
    /// Optional display hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Text or binary resource contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResourceContents {
    /// Text-representable contents.
    Text(super::resources::TextResourceContents),
    /// Binary contents.
    Blob(super::resources::BlobResourceContents),
}

/// Model-requested tool invocation inside a sampling message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUseContent {
    /// Invocation identifier, echoed by the matching tool result.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    pub input: Value,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Result of a tool invocation inside a sampling user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultContent {
    /// Identifier of the tool use this result answers.
    #[serde(rename = "toolUseId")]
    pub tool_use_id: String,
    /// Nested content, restricted to the tool-result whitelist.
    pub content: ContentList,
    /// Whether the tool invocation failed.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_tagged_roundtrip_every_variant() {
        let variants = vec![
            Content::text("hello"),
            Content::Image(ImageContent {
                data: "aGk=".into(),
                mime_type: "image/png".into(),
                annotations: None,
                meta: None,
            }),
            Content::Audio(AudioContent {
                data: String::new(),
                mime_type: "audio/wav".into(),
                annotations: None,
                meta: None,
            }),
            Content::ResourceLink(ResourceLink {
                name: "readme".into(),
                title: None,
                uri: "file:///readme.md".into(),
                description: None,
                mime_type: None,
                size: None,
                annotations: None,
                meta: None,
            }),
            Content::ToolUse(ToolUseContent {
                id: "call-1".into(),
                name: "greet".into(),
                input: json!({"name": "user"}),
                meta: None,
            }),
            Content::ToolResult(ToolResultContent {
                tool_use_id: "call-1".into(),
                content: ContentList::single(Content::text("hi user")),
                is_error: None,
                meta: None,
            }),
        ];
        for original in variants {
            let value = serde_json::to_value(&original).unwrap();
            assert_eq!(value["type"], json!(original.kind()));
            let back: Content = serde_json::from_value(value).unwrap();
            assert_eq!(back, original);
        }
    }

    #[test]
    fn test_empty_text_field_is_serialized() {
        let value = serde_json::to_value(Content::text("")).unwrap();
        assert_eq!(value, json!({"type": "text", "text": ""}));
    }

    #[test]
    fn test_empty_data_field_is_serialized() {
        let value = serde_json::to_value(Content::Audio(AudioContent {
            data: String::new(),
            mime_type: "audio/wav".into(),
            annotations: None,
            meta: None,
        }))
        .unwrap();
        assert_eq!(value["data"], json!(""));
    }

    #[test]
    fn test_tool_result_whitelist() {
        let value = json!({
            "type": "tool_use",
            "id": "x",
            "name": "greet",
            "input": {}
        });
        let err = Content::decode_in(value, ContentContext::ToolResult).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidParams(_)), "{err}");

        let ok = json!({"type": "text", "text": "fine"});
        assert!(Content::decode_in(ok, ContentContext::ToolResult).is_ok());
    }

    #[test]
    fn test_sampling_whitelists() {
        let tool_result = json!({
            "type": "tool_result",
            "toolUseId": "x",
            "content": {"type": "text", "text": "out"}
        });
        assert!(Content::decode_in(tool_result.clone(), ContentContext::SamplingAssistant).is_err());
        assert!(Content::decode_in(tool_result, ContentContext::SamplingUser).is_ok());

        let tool_use = json!({"type": "tool_use", "id": "x", "name": "n", "input": {}});
        assert!(Content::decode_in(tool_use, ContentContext::SamplingAssistant).is_ok());
    }

    #[test]
    fn test_nested_tool_result_content_is_checked() {
        let value = json!({
            "type": "tool_result",
            "toolUseId": "x",
            "content": [{"type": "tool_use", "id": "y", "name": "n", "input": {}}]
        });
        let err = Content::decode_in(value, ContentContext::SamplingUser).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidParams(_)));
    }

    #[test]
    fn test_content_list_singleton_encodes_as_object() {
        let list = ContentList::single(Content::text("only"));
        let value = serde_json::to_value(&list).unwrap();
        assert!(value.is_object());

        let pair = ContentList(vec![Content::text("a"), Content::text("b")]);
        let value = serde_json::to_value(&pair).unwrap();
        assert!(value.is_array());
    }

    #[test]
    fn test_content_list_accepts_object_or_array() {
        let from_object: ContentList =
            serde_json::from_value(json!({"type": "text", "text": "x"})).unwrap();
        assert_eq!(from_object.0.len(), 1);

        let from_array: ContentList = serde_json::from_value(json!([
            {"type": "text", "text": "x"},
            {"type": "text", "text": "y"}
        ]))
        .unwrap();
        assert_eq!(from_array.0.len(), 2);

        assert!(serde_json::from_value::<ContentList>(json!("nope")).is_err());
    }
}
