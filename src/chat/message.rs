//! Chat message records
//!
//! A [`ChatMessage`] is one entry of the visible conversation. User messages
//! are created locally (optimistically) when sent; assistant messages are
//! built from inbound `message` frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Deserialize an optional field, treating an explicit `null` like a
/// missing key.
///
/// Pair with `#[serde(default)]` so absent keys work too.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person using the app
    User,
    /// The AI astrologer
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A tool invocation the assistant made while composing a reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Tool name (e.g. `get_chart_positions`)
    pub name: String,
    /// Arguments the tool was called with
    #[serde(default)]
    pub input: serde_json::Value,
    /// Whatever the tool returned
    #[serde(default)]
    pub output: serde_json::Value,
    /// Whether the call succeeded
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Client-generated for optimistic entries
    pub id: String,
    /// Author
    pub role: Role,
    /// Plain text body
    pub content: String,
    /// Assigned when the message is appended to the list
    pub timestamp: DateTime<Utc>,
    /// Tool calls attached to assistant replies
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Birth charts that scoped this message
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub chart_references: Vec<String>,
}

impl ChatMessage {
    /// A new message stamped with a fresh id and the current time.
    ///
    /// # Examples
    ///
    /// ```
    /// use astrochat::chat::{ChatMessage, Role};
    ///
    /// let msg = ChatMessage::new(Role::User, "What is my rising sign?");
    /// assert_eq!(msg.role, Role::User);
    /// assert!(msg.tool_calls.is_empty());
    /// ```
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            chart_references: Vec::new(),
        }
    }

    /// Attach chart references
    pub fn with_chart_references(mut self, charts: Vec<String>) -> Self {
        self.chart_references = charts;
        self
    }

    /// Attach tool call records
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_messages_get_distinct_ids() {
        let a = ChatMessage::new(Role::User, "a");
        let b = ChatMessage::new(Role::User, "a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::User.to_string(), "user");
    }

    #[test]
    fn test_tool_call_defaults_missing_fields() {
        let call: ToolCallRecord = serde_json::from_str(r#"{"name":"get_transits"}"#).unwrap();
        assert_eq!(call.name, "get_transits");
        assert!(call.input.is_null());
        assert!(!call.success);
    }

    #[test]
    fn test_builders_attach_context() {
        let msg = ChatMessage::new(Role::Assistant, "Your Sun is in Leo")
            .with_chart_references(vec!["chart-1".to_string()])
            .with_tool_calls(vec![ToolCallRecord {
                name: "get_chart".to_string(),
                input: serde_json::json!({"id": "chart-1"}),
                output: serde_json::json!({"sun": "Leo"}),
                success: true,
            }]);
        assert_eq!(msg.chart_references, vec!["chart-1"]);
        assert_eq!(msg.tool_calls.len(), 1);
    }
}
