//! Params for the session-level notifications: ping, progress, cancellation.

use serde::{Deserialize, Serialize};

use super::core::{Meta, ProgressToken};
use crate::jsonrpc::RequestId;

/// Parameters of `ping` (none beyond metadata).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PingParams {
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Parameters of `notifications/progress`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressParams {
    /// Token from the originating request's `_meta`.
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,
    /// Work completed so far; must increase between notifications.
    pub progress: f64,
    /// Total expected work, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Human-readable status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Parameters of `notifications/cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelledParams {
    /// ID of the request being cancelled.
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    /// Optional reason, for logging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_wire_shape() {
        let params = ProgressParams {
            progress_token: ProgressToken::Number(5),
            progress: 2.0,
            total: Some(10.0),
            message: Some("halfway there".into()),
            meta: None,
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["progressToken"], json!(5));
        assert_eq!(value["total"], json!(10.0));
    }

    #[test]
    fn test_cancelled_roundtrip() {
        let params = CancelledParams {
            request_id: RequestId::Number(3),
            reason: None,
            meta: None,
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value, json!({"requestId": 3}));
        let back: CancelledParams = serde_json::from_value(value).unwrap();
        assert_eq!(back, params);
    }
}
