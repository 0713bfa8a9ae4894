//! Core protocol types shared across feature areas.
//!
//! - [`Meta`] - the `_meta` map carried by every params/result object
//! - [`ProgressToken`] - caller-assigned token associating work with progress
//! - [`Implementation`] - peer identity exchanged during initialization
//! - [`Annotations`] - optional display hints on content and catalog entries
//! - [`Role`] - conversation role for sampling and prompt messages
//! - [`Cursor`] - opaque pagination cursor

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::jsonrpc::RequestId;

/// The `_meta` map attached to params and results.
pub type Meta = serde_json::Map<String, Value>;

/// Reserved `_meta` key carrying the progress token.
pub const PROGRESS_TOKEN_KEY: &str = "progressToken";

/// Opaque pagination cursor.
pub type Cursor = String;

/// Caller-assigned token that routes progress notifications back to a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProgressToken {
    /// Numeric token.
    Number(i64),
    /// String token.
    String(String),
}

impl Serialize for ProgressToken {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Number(n) => serializer.serialize_i64(*n),
            Self::String(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for ProgressToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_i64()
                .map(Self::Number)
                .ok_or_else(|| serde::de::Error::custom("progress token must be an integer")),
            Value::String(s) => Ok(Self::String(s)),
            other => Err(serde::de::Error::custom(format!(
                "progress token must be a number or string, got {other}"
            ))),
        }
    }
}

impl fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&RequestId> for ProgressToken {
    fn from(id: &RequestId) -> Self {
        match id {
            RequestId::Number(n) => Self::Number(*n),
            RequestId::String(s) => Self::String(s.clone()),
        }
    }
}

/// Read the progress token out of a `_meta` map, if present.
pub fn progress_token_from_meta(meta: Option<&Meta>) -> Option<ProgressToken> {
    let value = meta?.get(PROGRESS_TOKEN_KEY)?;
    serde_json::from_value(value.clone()).ok()
}

/// Insert a progress token into a `_meta` map, creating the map if needed.
pub fn set_progress_token(meta: &mut Option<Meta>, token: &ProgressToken) {
    let map = meta.get_or_insert_with(Meta::new);
    map.insert(
        PROGRESS_TOKEN_KEY.to_string(),
        serde_json::to_value(token).unwrap_or(Value::Null),
    );
}

/// Implementation identity exchanged during initialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Implementation {
    /// Implementation name (programmatic identifier).
    pub name: String,
    /// Display title for UI contexts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Implementation version.
    pub version: String,
}

impl Implementation {
    /// Create a new implementation identity.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            version: version.into(),
        }
    }
}

impl Default for Implementation {
    fn default() -> Self {
        Self::new("unknown", "0.0.0")
    }
}

/// Optional display hints attached to content blocks and catalog entries.
///
/// These are weak hints; peers may ignore them entirely.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Annotations {
    /// Intended audience roles ("user" / "assistant").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<Role>>,
    /// Subjective importance hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    /// ISO 8601 timestamp of last modification.
    #[serde(rename = "lastModified", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Content produced by or for the user.
    User,
    /// Content produced by the model.
    Assistant,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_token_from_meta() {
        let mut meta = Meta::new();
        meta.insert("progressToken".into(), json!(42));
        assert_eq!(
            progress_token_from_meta(Some(&meta)),
            Some(ProgressToken::Number(42))
        );

        meta.insert("progressToken".into(), json!("abc"));
        assert_eq!(
            progress_token_from_meta(Some(&meta)),
            Some(ProgressToken::String("abc".into()))
        );

        assert_eq!(progress_token_from_meta(None), None);
    }

    #[test]
    fn test_set_progress_token_creates_map() {
        let mut meta = None;
        set_progress_token(&mut meta, &ProgressToken::Number(7));
        assert_eq!(progress_token_from_meta(meta.as_ref()), Some(ProgressToken::Number(7)));
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }

    #[test]
    fn test_progress_token_from_request_id() {
        let id = RequestId::Number(9);
        assert_eq!(ProgressToken::from(&id), ProgressToken::Number(9));
    }
}
