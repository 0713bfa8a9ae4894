//! Logging types: severity ladder, level selection, and log notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::core::Meta;

/// Syslog-style severity ladder, least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    /// Detailed debugging information.
    Debug,
    /// Normal operational messages.
    Info,
    /// Normal but significant events.
    Notice,
    /// Warning conditions.
    Warning,
    /// Error conditions.
    Error,
    /// Critical conditions.
    Critical,
    /// Action must be taken immediately.
    Alert,
    /// System is unusable.
    Emergency,
}

impl LoggingLevel {
    /// Whether a message at `level` passes a threshold of `self`.
    pub fn allows(self, level: LoggingLevel) -> bool {
        level >= self
    }
}

/// Parameters of `logging/setLevel`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetLevelParams {
    /// Minimum level the client wants to receive.
    pub level: LoggingLevel,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Parameters of `notifications/message`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingMessageParams {
    /// Severity of this message.
    pub level: LoggingLevel,
    /// Name of the originating logger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Arbitrary JSON payload.
    pub data: Value,
    /// Extension metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(LoggingLevel::Debug < LoggingLevel::Info);
        assert!(LoggingLevel::Error < LoggingLevel::Emergency);
        assert!(LoggingLevel::Warning.allows(LoggingLevel::Error));
        assert!(!LoggingLevel::Warning.allows(LoggingLevel::Info));
        assert!(LoggingLevel::Debug.allows(LoggingLevel::Debug));
    }

    #[test]
    fn test_level_wire_names() {
        assert_eq!(
            serde_json::to_string(&LoggingLevel::Warning).unwrap(),
            "\"warning\""
        );
        let level: LoggingLevel = serde_json::from_str("\"emergency\"").unwrap();
        assert_eq!(level, LoggingLevel::Emergency);
    }
}
