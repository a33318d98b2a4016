//! Chat wire frames
//!
//! Every frame is a single JSON object discriminated by its `type` field.
//!
//! Outbound (client -> server):
//!
//! ```text
//! { "type": "message", "content": "...", "conversation_id": "..."|null, "chart_references"?: [..] }
//! ```
//!
//! Inbound (server -> client): `connected`, `conversation_created`,
//! `message`, `error`. Unknown types decode to [`ServerFrame::Unknown`] so a
//! newer server never breaks an older client.

use serde::{Deserialize, Serialize};

use crate::chat::message::{null_as_default, Role, ToolCallRecord};
use crate::error::{AstroChatError, Result};

/// Error discriminator the server uses when the plan's quota is used up.
pub const MESSAGE_LIMIT_EXCEEDED: &str = "message_limit_exceeded";

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A user message for the assistant
    Message {
        /// Message text
        content: String,
        /// Conversation to append to; `null` starts a new one
        conversation_id: Option<String>,
        /// Birth charts scoping the reply
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        chart_references: Vec<String>,
    },
}

impl ClientFrame {
    /// Serialize to the JSON text sent over the wire.
    ///
    /// # Examples
    ///
    /// ```
    /// use astrochat::chat::frame::ClientFrame;
    ///
    /// let frame = ClientFrame::Message {
    ///     content: "hi".to_string(),
    ///     conversation_id: None,
    ///     chart_references: vec![],
    /// };
    /// assert_eq!(
    ///     frame.encode().unwrap(),
    ///     r#"{"type":"message","content":"hi","conversation_id":null}"#
    /// );
    /// ```
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Frames pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake acknowledgement
    Connected {
        /// Greeting text
        #[serde(default)]
        message: Option<String>,
        /// Authenticated user
        #[serde(default)]
        user_id: Option<String>,
    },
    /// The server created a conversation for this session
    ConversationCreated {
        /// Server-assigned conversation id
        conversation_id: String,
    },
    /// A chat message
    Message {
        /// Author
        role: Role,
        /// Message text
        content: String,
        /// Conversation the message belongs to
        #[serde(default)]
        conversation_id: Option<String>,
        /// Tool calls made while composing the reply
        #[serde(default, deserialize_with = "null_as_default")]
        tool_calls: Vec<ToolCallRecord>,
        /// Charts the reply drew on
        #[serde(default, deserialize_with = "null_as_default")]
        chart_references: Vec<String>,
    },
    /// The server rejected or failed a request
    Error {
        /// Error discriminator (e.g. `message_limit_exceeded`)
        error: String,
        /// Optional machine-readable code
        #[serde(default)]
        code: Option<serde_json::Value>,
        /// Optional human-readable detail
        #[serde(default)]
        message: Option<String>,
    },
    /// A frame type this client does not know
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    /// Decode one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`AstroChatError::Protocol`] when the text is not JSON or
    /// does not match any frame shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use astrochat::chat::frame::ServerFrame;
    ///
    /// let frame = ServerFrame::decode(r#"{"type":"conversation_created","conversation_id":"c1"}"#).unwrap();
    /// assert_eq!(frame, ServerFrame::ConversationCreated { conversation_id: "c1".to_string() });
    /// assert!(ServerFrame::decode("not json").is_err());
    /// ```
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| AstroChatError::Protocol(format!("invalid frame: {}", e)).into())
    }

    /// `true` for the quota-exhausted error frame.
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, ServerFrame::Error { error, .. } if error == MESSAGE_LIMIT_EXCEEDED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_includes_chart_references_when_present() {
        let frame = ClientFrame::Message {
            content: "Tell me about my Moon".to_string(),
            conversation_id: Some("conv-9".to_string()),
            chart_references: vec!["chart-1".to_string(), "chart-2".to_string()],
        };
        let value: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["conversation_id"], "conv-9");
        assert_eq!(value["chart_references"], serde_json::json!(["chart-1", "chart-2"]));
    }

    #[test]
    fn test_decode_connected() {
        let frame =
            ServerFrame::decode(r#"{"type":"connected","message":"welcome","user_id":"u1"}"#)
                .unwrap();
        assert_eq!(
            frame,
            ServerFrame::Connected {
                message: Some("welcome".to_string()),
                user_id: Some("u1".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_assistant_message_with_tools() {
        let text = r#"{
            "type": "message",
            "role": "assistant",
            "content": "Your Venus is in Libra.",
            "conversation_id": "c1",
            "tool_calls": [{"name": "get_chart", "input": {"id": "x"}, "output": {}, "success": true}],
            "chart_references": ["x"]
        }"#;
        match ServerFrame::decode(text).unwrap() {
            ServerFrame::Message {
                role,
                tool_calls,
                chart_references,
                ..
            } => {
                assert_eq!(role, Role::Assistant);
                assert_eq!(tool_calls.len(), 1);
                assert!(tool_calls[0].success);
                assert_eq!(chart_references, vec!["x"]);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_decode_message_without_optional_fields() {
        let frame =
            ServerFrame::decode(r#"{"type":"message","role":"user","content":"hi"}"#).unwrap();
        assert!(matches!(frame, ServerFrame::Message { tool_calls, .. } if tool_calls.is_empty()));
    }

    #[test]
    fn test_decode_message_with_null_optional_fields() {
        let text = r#"{
            "type": "message",
            "role": "assistant",
            "content": "reply",
            "conversation_id": null,
            "tool_calls": null,
            "chart_references": null
        }"#;
        match ServerFrame::decode(text).unwrap() {
            ServerFrame::Message {
                tool_calls,
                chart_references,
                conversation_id,
                ..
            } => {
                assert!(tool_calls.is_empty());
                assert!(chart_references.is_empty());
                assert!(conversation_id.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_decode_tool_call_with_null_fields() {
        let text = r#"{
            "type": "message",
            "role": "assistant",
            "content": "reply",
            "tool_calls": [{"name": "get_chart", "input": null, "output": null, "success": null}]
        }"#;
        match ServerFrame::decode(text).unwrap() {
            ServerFrame::Message { tool_calls, .. } => {
                assert_eq!(tool_calls.len(), 1);
                assert!(!tool_calls[0].success);
                assert!(tool_calls[0].output.is_null());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_limit_exceeded_detection() {
        let limit = ServerFrame::decode(r#"{"type":"error","error":"message_limit_exceeded","code":402}"#)
            .unwrap();
        assert!(limit.is_limit_exceeded());

        let other = ServerFrame::decode(r#"{"type":"error","error":"internal"}"#).unwrap();
        assert!(!other.is_limit_exceeded());
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        let frame = ServerFrame::decode(r#"{"type":"typing"}"#).unwrap();
        assert_eq!(frame, ServerFrame::Unknown);
    }

    #[test]
    fn test_message_missing_role_is_protocol_error() {
        let err = ServerFrame::decode(r#"{"type":"message","content":"x"}"#).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AstroChatError>(),
            Some(AstroChatError::Protocol(_))
        ));
    }
}
