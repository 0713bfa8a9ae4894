//! JSON-RPC 2.0 message envelopes and the wire codec.
//!
//! The codec is strict in the directions that matter for conformance:
//! invalid JSON fails with a parse error, shape violations (wrong version,
//! `null` where a value is required, fractional request IDs, a response
//! carrying both `result` and `error`) fail with an invalid-request error,
//! and integer request IDs round-trip exactly without float normalization.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

/// JSON-RPC version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC version marker that validates on decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid JSON-RPC version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// JSON-RPC request identifier: a non-null integer or string.
///
/// Integer IDs are stored as `i64` and serialized as JSON integers so they
/// survive a round trip bit-exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestId {
    /// Numeric identifier.
    Number(i64),
    /// String identifier.
    String(String),
}

impl Serialize for RequestId {
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

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Self::Number)
                .ok_or_else(|| serde::de::Error::custom("request id must be an integer")),
            Value::String(s) => Ok(Self::String(s)),
            other => Err(serde::de::Error::custom(format!(
                "request id must be a number or string, got {other}"
            ))),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// JSON-RPC request message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// Protocol version marker.
    pub jsonrpc: JsonRpcVersion,
    /// Request identifier.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new request.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            method: method.into(),
            params,
        }
    }

    /// Create a request, serializing typed parameters.
    pub fn with_params<P: Serialize>(
        id: RequestId,
        method: impl Into<String>,
        params: &P,
    ) -> ProtocolResult<Self> {
        let value = serde_json::to_value(params)
            .map_err(|e| ProtocolError::Internal(e.to_string()))?;
        Ok(Self::new(id, method, Some(value)))
    }
}

/// JSON-RPC notification message (no response expected).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    /// Protocol version marker.
    pub jsonrpc: JsonRpcVersion,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }

    /// Create a notification, serializing typed parameters.
    pub fn with_params<P: Serialize>(method: impl Into<String>, params: &P) -> ProtocolResult<Self> {
        let value = serde_json::to_value(params)
            .map_err(|e| ProtocolError::Internal(e.to_string()))?;
        Ok(Self::new(method, Some(value)))
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    /// Machine-readable error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Additional structured context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create an error with code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Response payload: exactly one of result or error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Successful response.
    Success {
        /// Response result value.
        result: Value,
    },
    /// Error response.
    Error {
        /// Response error object.
        error: JsonRpcError,
    },
}

/// Response ID: null only for responses to unparseable requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Option<RequestId>);

impl ResponseId {
    /// Response ID echoing a request.
    pub fn from_request(id: RequestId) -> Self {
        Self(Some(id))
    }

    /// Null ID, used only when the request ID could not be parsed.
    pub fn null() -> Self {
        Self(None)
    }

    /// The echoed request ID, if present.
    pub fn as_request_id(&self) -> Option<&RequestId> {
        self.0.as_ref()
    }
}

/// JSON-RPC response message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    /// Protocol version marker.
    pub jsonrpc: JsonRpcVersion,
    /// Echoed request identifier.
    pub id: ResponseId,
    /// Result or error, never both.
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    /// Create a successful response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: ResponseId::from_request(id),
            payload: ResponsePayload::Success { result },
        }
    }

    /// Create an error response.
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: ResponseId::from_request(id),
            payload: ResponsePayload::Error { error },
        }
    }

    /// Create a parse-error response with a null ID.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: ResponseId::null(),
            payload: ResponsePayload::Error {
                error: JsonRpcError::new(crate::error::error_codes::PARSE_ERROR, message),
            },
        }
    }

    /// The result value, if this is a success response.
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Success { result } => Some(result),
            ResponsePayload::Error { .. } => None,
        }
    }

    /// The error object, if this is an error response.
    pub fn error_object(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            ResponsePayload::Success { .. } => None,
            ResponsePayload::Error { error } => Some(error),
        }
    }

    /// Whether the response carries a result.
    pub fn is_success(&self) -> bool {
        matches!(self.payload, ResponsePayload::Success { .. })
    }
}

/// A single JSON-RPC message of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// Request expecting a response.
    Request(JsonRpcRequest),
    /// Response to an earlier request.
    Response(JsonRpcResponse),
    /// Fire-and-forget notification.
    Notification(JsonRpcNotification),
    /// Batch of messages.
    Batch(Vec<JsonRpcMessage>),
}

impl JsonRpcMessage {
    /// The method name, when this is a request or notification.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            _ => None,
        }
    }

    /// The request ID, when this is a request.
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            _ => None,
        }
    }

    /// Classify a decoded JSON value into a message, validating shape.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        if let Value::Array(items) = value {
            let mut messages = Vec::with_capacity(items.len());
            for item in items {
                messages.push(Self::from_value(item)?);
            }
            return Ok(Self::Batch(messages));
        }

        let Value::Object(ref obj) = value else {
            return Err(ProtocolError::InvalidRequest(
                "message must be a JSON object or array".into(),
            ));
        };

        match obj.get("jsonrpc") {
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            Some(other) => {
                return Err(ProtocolError::InvalidRequest(format!(
                    "invalid JSON-RPC version: {other}"
                )));
            }
            None => {
                return Err(ProtocolError::InvalidRequest(
                    "missing jsonrpc version field".into(),
                ));
            }
        }

        let has_method = obj.contains_key("method");
        let has_result = obj.contains_key("result");
        let has_error = obj.contains_key("error");

        if has_method {
            if has_result || has_error {
                return Err(ProtocolError::InvalidRequest(
                    "message mixes method with result or error".into(),
                ));
            }
            if let Some(Value::Null) = obj.get("method") {
                return Err(ProtocolError::InvalidRequest("method must not be null".into()));
            }
            if let Some(Value::Null) = obj.get("params") {
                return Err(ProtocolError::InvalidRequest("params must not be null".into()));
            }
            return match obj.get("id") {
                None => {
                    let notification: JsonRpcNotification = serde_json::from_value(value)
                        .map_err(|e| ProtocolError::InvalidRequest(e.to_string()))?;
                    Ok(Self::Notification(notification))
                }
                Some(Value::Null) => Err(ProtocolError::InvalidRequest(
                    "request id must not be null".into(),
                )),
                Some(_) => {
                    let request: JsonRpcRequest = serde_json::from_value(value)
                        .map_err(|e| ProtocolError::InvalidRequest(e.to_string()))?;
                    Ok(Self::Request(request))
                }
            };
        }

        if has_result || has_error {
            if has_result && has_error {
                return Err(ProtocolError::InvalidRequest(
                    "response carries both result and error".into(),
                ));
            }
            if let Some(Value::Null) = obj.get("result") {
                return Err(ProtocolError::InvalidRequest("result must not be null".into()));
            }
            if !obj.contains_key("id") {
                return Err(ProtocolError::InvalidRequest("response missing id".into()));
            }
            let response: JsonRpcResponse = serde_json::from_value(value)
                .map_err(|e| ProtocolError::InvalidRequest(e.to_string()))?;
            return Ok(Self::Response(response));
        }

        Err(ProtocolError::InvalidRequest(
            "message is neither request, response, nor notification".into(),
        ))
    }
}

impl Serialize for JsonRpcMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Request(r) => r.serialize(serializer),
            Self::Response(r) => r.serialize(serializer),
            Self::Notification(n) => n.serialize(serializer),
            Self::Batch(items) => items.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(r: JsonRpcRequest) -> Self {
        Self::Request(r)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(r: JsonRpcResponse) -> Self {
        Self::Response(r)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(n: JsonRpcNotification) -> Self {
        Self::Notification(n)
    }
}

/// Encode a message to bytes.
pub fn encode(message: &JsonRpcMessage) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| ProtocolError::Internal(e.to_string()))
}

/// Decode a single message (or batch) from bytes.
///
/// Invalid JSON fails with [`ProtocolError::Parse`]; a well-formed JSON value
/// that is not a valid JSON-RPC message fails with
/// [`ProtocolError::InvalidRequest`].
pub fn decode(bytes: &[u8]) -> ProtocolResult<JsonRpcMessage> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Parse(e.to_string()))?;
    JsonRpcMessage::from_value(value)
}

/// Decode bytes into a flat list of messages.
///
/// A batch yields its members; a single message yields a one-element list.
pub fn decode_batch(bytes: &[u8]) -> ProtocolResult<Vec<JsonRpcMessage>> {
    match decode(bytes)? {
        JsonRpcMessage::Batch(items) => Ok(items),
        message => Ok(vec![message]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_version_roundtrip() {
        let json = serde_json::to_string(&JsonRpcVersion).unwrap();
        assert_eq!(json, "\"2.0\"");
        let parsed: JsonRpcVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, JsonRpcVersion);
        assert!(serde_json::from_str::<JsonRpcVersion>("\"1.0\"").is_err());
    }

    #[test]
    fn test_integer_id_preserved_exactly() {
        let large = i64::MAX - 7;
        let request = JsonRpcRequest::new(RequestId::Number(large), "ping", None);
        let bytes = encode(&JsonRpcMessage::Request(request)).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains(&large.to_string()));
        assert!(!text.contains('.'));

        match decode(&bytes).unwrap() {
            JsonRpcMessage::Request(r) => assert_eq!(r.id, RequestId::Number(large)),
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn test_fractional_id_rejected() {
        let bytes = br#"{"jsonrpc":"2.0","id":1.5,"method":"ping"}"#;
        let err = decode(bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidRequest(_)), "{err}");
    }

    #[test]
    fn test_null_id_rejected() {
        let bytes = br#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#;
        assert!(matches!(
            decode(bytes).unwrap_err(),
            ProtocolError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        assert!(matches!(decode(b"{nope"), Err(ProtocolError::Parse(_))));
    }

    #[test]
    fn test_missing_version_is_invalid_request() {
        let bytes = br#"{"id":1,"method":"ping"}"#;
        assert!(matches!(
            decode(bytes).unwrap_err(),
            ProtocolError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_notification_classification() {
        let bytes = br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        match decode(bytes).unwrap() {
            JsonRpcMessage::Notification(n) => {
                assert_eq!(n.method, "notifications/initialized");
                assert!(n.params.is_none());
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn test_response_result_xor_error() {
        let both = br#"{"jsonrpc":"2.0","id":1,"result":{},"error":{"code":1,"message":"x"}}"#;
        assert!(matches!(
            decode(both).unwrap_err(),
            ProtocolError::InvalidRequest(_)
        ));

        let neither = br#"{"jsonrpc":"2.0","id":1}"#;
        assert!(matches!(
            decode(neither).unwrap_err(),
            ProtocolError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_null_result_rejected() {
        let bytes = br#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        assert!(matches!(
            decode(bytes).unwrap_err(),
            ProtocolError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_parse_error_response_null_id() {
        let response = JsonRpcResponse::parse_error("bad json");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], json!(-32700));
    }

    #[test]
    fn test_batch_roundtrip() {
        let batch = JsonRpcMessage::Batch(vec![
            JsonRpcMessage::Request(JsonRpcRequest::new(RequestId::Number(1), "ping", None)),
            JsonRpcMessage::Notification(JsonRpcNotification::new(
                "notifications/initialized",
                None,
            )),
        ]);
        let bytes = encode(&batch).unwrap();
        let messages = decode_batch(&bytes).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].method(), Some("ping"));
        assert_eq!(messages[1].method(), Some("notifications/initialized"));
    }

    #[test]
    fn test_decode_batch_of_single() {
        let bytes = br#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#;
        let messages = decode_batch(bytes).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].request_id(), Some(&RequestId::Number(7)));
    }

    #[test]
    fn test_message_roundtrip_all_kinds() {
        let originals = vec![
            JsonRpcMessage::Request(JsonRpcRequest::new(
                RequestId::String("req-1".into()),
                "tools/call",
                Some(json!({"name": "greet"})),
            )),
            JsonRpcMessage::Response(JsonRpcResponse::success(
                RequestId::Number(3),
                json!({"ok": true}),
            )),
            JsonRpcMessage::Response(JsonRpcResponse::error(
                RequestId::Number(4),
                JsonRpcError::new(-32601, "method not found"),
            )),
            JsonRpcMessage::Notification(JsonRpcNotification::new(
                "notifications/progress",
                Some(json!({"progressToken": 3, "progress": 1.0})),
            )),
        ];
        for original in originals {
            let decoded = decode(&encode(&original).unwrap()).unwrap();
            assert_eq!(decoded, original);
        }
    }
}
