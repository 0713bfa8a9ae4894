//! User input elicitation types.
//!
//! Two modes:
//!
//! - **Form**: the server supplies a JSON Schema restricted to flat primitive
//!   properties; the client renders a form and returns the values in-band.
//! - **URL**: the server supplies a URL for out-of-band input; no schema is
//!   allowed, and completion may be signaled later via
//!   `notifications/elicitation/complete`.
//!
//! The requested schema is validated on the server before transmission.
//! Unsupported constructs fail with invalid-params errors whose messages name
//! the offending kind (nested properties, unsupported format, invalid default
//! value), so misuse is diagnosable from the error text alone.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::core::Meta;
use crate::error::{ProtocolError, ProtocolResult};

/// String formats permitted in elicitation schemas.
const SUPPORTED_STRING_FORMATS: &[&str] = &["email", "uri", "date", "date-time"];

/// Action the user took on an elicitation request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationAction {
    /// User submitted the form or confirmed the action.
    Accept,
    /// User explicitly declined.
    Decline,
    /// User dismissed without choosing.
    Cancel,
}

/// Elicitation delivery mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationMode {
    /// Inline schema-driven form.
    #[default]
    Form,
    /// External URL.
    Url,
}

/// Schema for form-mode elicitation, restricted to flat primitive properties.
///
/// Properties are held as raw JSON values so that [`validate`](Self::validate)
/// can report precisely which construct is unsupported; the builder methods
/// only produce well-formed properties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElicitationSchema {
    /// Schema type; must be "object".
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property schemas keyed by field name, ordered for determinism.
    pub properties: BTreeMap<String, Value>,
    /// Required field names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl Default for ElicitationSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl ElicitationSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: None,
        }
    }

    fn push_required(&mut self, name: &str) {
        let required = self.required.get_or_insert_with(Vec::new);
        if !required.iter().any(|r| r == name) {
            required.push(name.to_string());
        }
    }

    /// Add a string property.
    pub fn string_property(mut self, name: impl Into<String>, required: bool) -> Self {
        let name = name.into();
        self.properties
            .insert(name.clone(), serde_json::json!({"type": "string"}));
        if required {
            self.push_required(&name);
        }
        self
    }

    /// Add a number property with optional bounds.
    pub fn number_property(
        mut self,
        name: impl Into<String>,
        required: bool,
        minimum: Option<f64>,
        maximum: Option<f64>,
    ) -> Self {
        let name = name.into();
        let mut prop = serde_json::Map::new();
        prop.insert("type".into(), Value::from("number"));
        if let Some(min) = minimum {
            prop.insert("minimum".into(), Value::from(min));
        }
        if let Some(max) = maximum {
            prop.insert("maximum".into(), Value::from(max));
        }
        self.properties.insert(name.clone(), Value::Object(prop));
        if required {
            self.push_required(&name);
        }
        self
    }

    /// Add a boolean property with an optional default.
    pub fn boolean_property(
        mut self,
        name: impl Into<String>,
        required: bool,
        default: Option<bool>,
    ) -> Self {
        let name = name.into();
        let mut prop = serde_json::Map::new();
        prop.insert("type".into(), Value::from("boolean"));
        if let Some(default) = default {
            prop.insert("default".into(), Value::from(default));
        }
        self.properties.insert(name.clone(), Value::Object(prop));
        if required {
            self.push_required(&name);
        }
        self
    }

    /// Add a string enum property.
    pub fn enum_property(
        mut self,
        name: impl Into<String>,
        required: bool,
        values: Vec<String>,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            serde_json::json!({"type": "string", "enum": values}),
        );
        if required {
            self.push_required(&name);
        }
        self
    }

    /// Validate the schema against the flat-primitive restriction.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.schema_type != "object" {
            return Err(ProtocolError::InvalidParams(format!(
                "elicitation schema type must be \"object\", got {:?}",
                self.schema_type
            )));
        }
        for (name, prop) in &self.properties {
            validate_property(name, prop)?;
        }
        if let Some(required) = &self.required {
            for name in required {
                if !self.properties.contains_key(name) {
                    return Err(ProtocolError::InvalidParams(format!(
                        "required property {name:?} is not declared"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate accepted content against the schema.
    pub fn validate_content(&self, content: &serde_json::Map<String, Value>) -> ProtocolResult<()> {
        if let Some(required) = &self.required {
            for name in required {
                if !content.contains_key(name) {
                    return Err(ProtocolError::InvalidParams(format!(
                        "missing required property {name:?}"
                    )));
                }
            }
        }
        for (name, value) in content {
            let Some(prop) = self.properties.get(name) else {
                return Err(ProtocolError::InvalidParams(format!(
                    "unknown property {name:?}"
                )));
            };
            validate_value(name, prop, value)?;
        }
        Ok(())
    }
}

fn property_type(prop: &Value) -> ProtocolResult<&str> {
    prop.get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::InvalidParams("property schema missing type".into()))
}

fn validate_property(name: &str, prop: &Value) -> ProtocolResult<()> {
    let Value::Object(obj) = prop else {
        return Err(ProtocolError::InvalidParams(format!(
            "property {name:?} schema must be an object"
        )));
    };
    if obj.contains_key("properties") || obj.contains_key("items") {
        return Err(ProtocolError::InvalidParams(format!(
            "nested properties are not supported (property {name:?})"
        )));
    }
    let kind = property_type(prop)?;
    match kind {
        "string" => {
            if let Some(format) = obj.get("format") {
                let format = format.as_str().unwrap_or_default();
                if !SUPPORTED_STRING_FORMATS.contains(&format) {
                    return Err(ProtocolError::InvalidParams(format!(
                        "unsupported format {format:?} (property {name:?})"
                    )));
                }
            }
            if let Some(values) = obj.get("enum") {
                let all_strings = values
                    .as_array()
                    .is_some_and(|a| a.iter().all(Value::is_string));
                if !all_strings {
                    return Err(ProtocolError::InvalidParams(format!(
                        "enum values must be strings (property {name:?})"
                    )));
                }
            }
        }
        "number" | "integer" | "boolean" => {}
        other => {
            return Err(ProtocolError::InvalidParams(format!(
                "unsupported property type {other:?} (property {name:?})"
            )));
        }
    }
    if let Some(default) = obj.get("default")
        && !value_matches_type(kind, default)
    {
        return Err(ProtocolError::InvalidParams(format!(
            "invalid default value for property {name:?}"
        )));
    }
    Ok(())
}

fn value_matches_type(kind: &str, value: &Value) -> bool {
    match kind {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        _ => false,
    }
}

fn validate_value(name: &str, prop: &Value, value: &Value) -> ProtocolResult<()> {
    let kind = property_type(prop)?;
    if !value_matches_type(kind, value) {
        return Err(ProtocolError::InvalidParams(format!(
            "property {name:?} must be of type {kind}"
        )));
    }
    let Some(obj) = prop.as_object() else {
        return Ok(());
    };
    match kind {
        "string" => {
            let s = value.as_str().unwrap_or_default();
            if let Some(min) = obj.get("minLength").and_then(Value::as_u64)
                && (s.len() as u64) < min
            {
                return Err(ProtocolError::InvalidParams(format!(
                    "property {name:?} shorter than minLength {min}"
                )));
            }
            if let Some(max) = obj.get("maxLength").and_then(Value::as_u64)
                && (s.len() as u64) > max
            {
                return Err(ProtocolError::InvalidParams(format!(
                    "property {name:?} longer than maxLength {max}"
                )));
            }
            if let Some(values) = obj.get("enum").and_then(Value::as_array)
                && !values.iter().any(|v| v.as_str() == Some(s))
            {
                return Err(ProtocolError::InvalidParams(format!(
                    "property {name:?} not one of the allowed enum values"
                )));
            }
        }
        "number" | "integer" => {
            let n = value.as_f64().unwrap_or_default();
            if let Some(min) = obj.get("minimum").and_then(Value::as_f64)
                && n < min
            {
                return Err(ProtocolError::InvalidParams(format!(
                    "property {name:?} below minimum {min}"
                )));
            }
            if let Some(max) = obj.get("maximum").and_then(Value::as_f64)
                && n > max
            {
                return Err(ProtocolError::InvalidParams(format!(
                    "property {name:?} above maximum {max}"
                )));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parameters of `elicitation/create`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElicitParams {
    /// Message shown to the user.
    pub message: String,
    /// Delivery mode; defaults to form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ElicitationMode>,
    /// Schema of the requested input (form mode only).
    #[serde(rename = "requestedSchema", skip_serializing_if = "Option::is_none")]
    pub requested_schema: Option<ElicitationSchema>,
    /// External URL to open (URL mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Identifier correlating an out-of-band completion notification.
    #[serde(rename = "elicitationId", skip_serializing_if = "Option::is_none")]
    pub elicitation_id: Option<String>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl ElicitParams {
    /// Validate mode/schema/url consistency and the schema itself.
    pub fn validate(&self) -> ProtocolResult<()> {
        match self.mode.unwrap_or_default() {
            ElicitationMode::Form => {
                if self.url.is_some() {
                    return Err(ProtocolError::InvalidParams(
                        "form-mode elicitation must not carry a url".into(),
                    ));
                }
                let Some(schema) = &self.requested_schema else {
                    return Err(ProtocolError::InvalidParams(
                        "form-mode elicitation requires requestedSchema".into(),
                    ));
                };
                schema.validate()
            }
            ElicitationMode::Url => {
                if self.requested_schema.is_some() {
                    return Err(ProtocolError::InvalidParams(
                        "url-mode elicitation must not carry a schema".into(),
                    ));
                }
                if self.url.is_none() {
                    return Err(ProtocolError::InvalidParams(
                        "url-mode elicitation requires a url".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Result of `elicitation/create`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElicitResult {
    /// What the user did.
    pub action: ElicitationAction,
    /// Submitted values (accept only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Map<String, Value>>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Parameters of `notifications/elicitation/complete`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElicitationCompleteParams {
    /// Identifier of the completed elicitation.
    #[serde(rename = "elicitationId")]
    pub elicitation_id: String,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}
