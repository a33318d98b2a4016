//! Request and response bodies for the REST API
//!
//! Field names follow the server's snake_case JSON. Optional fields default
//! when absent so an older or newer server does not break decoding.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthTokens;
use crate::chat::message::{null_as_default, ChatMessage, Role, ToolCallRecord};

/// Credentials for `POST /api/auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
}

/// Body for `POST /api/auth/signup`
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    /// Account email
    pub email: String,
    /// Chosen password
    pub password: String,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// Token pair returned by login, signup and refresh
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer access token
    pub access_token: String,
    /// Refresh token, if the server rotated it
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Usually `bearer`
    #[serde(default)]
    pub token_type: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    /// Convert into storable tokens.
    ///
    /// `previous_refresh` is kept when the response does not carry a new
    /// refresh token.
    pub fn into_tokens(self, previous_refresh: Option<String>) -> AuthTokens {
        AuthTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

/// The logged-in account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Account id
    pub id: String,
    /// Account email
    pub email: String,
    /// Display name
    #[serde(default)]
    pub full_name: Option<String>,
    /// Registration time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A stored birth chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirthChart {
    /// Chart id, referenced by chat messages
    pub id: String,
    /// Label chosen by the user
    pub name: String,
    /// Date of birth
    pub birth_date: NaiveDate,
    /// Local time of birth (`HH:MM`), when known
    #[serde(default)]
    pub birth_time: Option<String>,
    /// Place of birth as entered
    pub birth_location: String,
    /// Geocoded latitude
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Geocoded longitude
    #[serde(default)]
    pub longitude: Option<f64>,
    /// IANA time zone of the birthplace
    #[serde(default)]
    pub timezone: Option<String>,
    /// Computed placements, opaque to the client
    #[serde(default)]
    pub chart_data: Option<serde_json::Value>,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body for `POST /api/charts`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewBirthChart {
    /// Label
    pub name: String,
    /// Date of birth
    pub birth_date: NaiveDate,
    /// Local time of birth (`HH:MM`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_time: Option<String>,
    /// Place of birth
    pub birth_location: String,
    /// Latitude, if already known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Longitude, if already known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// IANA time zone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// A conversation in the history list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation id
    pub id: String,
    /// Server-generated title
    #[serde(default)]
    pub title: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last activity
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Number of stored messages
    #[serde(default)]
    pub message_count: Option<u32>,
}

/// A stored chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message id
    #[serde(default)]
    pub id: Option<String>,
    /// Author
    pub role: Role,
    /// Text
    pub content: String,
    /// Tool calls made while composing it
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Charts it referenced
    #[serde(default, deserialize_with = "null_as_default")]
    pub chart_references: Vec<String>,
    /// When it was stored
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<StoredMessage> for ChatMessage {
    fn from(stored: StoredMessage) -> Self {
        let mut message = ChatMessage::new(stored.role, stored.content)
            .with_tool_calls(stored.tool_calls)
            .with_chart_references(stored.chart_references);
        if let Some(id) = stored.id {
            message.id = id;
        }
        if let Some(at) = stored.created_at {
            message.timestamp = at;
        }
        message
    }
}

/// A conversation with its messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    /// Summary fields
    #[serde(flatten)]
    pub summary: ConversationSummary,
    /// Messages, oldest first
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<StoredMessage>,
}

/// The user's subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Plan id (`free`, `pro`, ...)
    pub plan: String,
    /// Billing status (`active`, `canceled`, `past_due`, ...)
    pub status: String,
    /// End of the paid period
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
    /// Whether the plan lapses at period end
    #[serde(default, deserialize_with = "null_as_default")]
    pub cancel_at_period_end: bool,
}

/// A purchasable plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan id used for checkout
    pub id: String,
    /// Display name
    pub name: String,
    /// Price in the smallest currency unit
    #[serde(default)]
    pub price_cents: u32,
    /// Billing interval (`month`, `year`)
    #[serde(default)]
    pub interval: Option<String>,
    /// Monthly message quota; `None` means unlimited
    #[serde(default)]
    pub messages_per_month: Option<u32>,
    /// Marketing bullet points
    #[serde(default, deserialize_with = "null_as_default")]
    pub features: Vec<String>,
}

/// Body for `POST /api/subscription/checkout`
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    /// Plan to buy
    pub plan_id: String,
    /// Where the hosted page sends the user after paying
    pub success_url: String,
    /// Where the hosted page sends the user after backing out
    pub cancel_url: String,
}

/// A hosted checkout session
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutSession {
    /// Page to open in a browser
    pub checkout_url: String,
    /// Provider session id
    #[serde(default)]
    pub session_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_keeps_previous_refresh_token() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a2","token_type":"bearer"}"#).unwrap();
        let tokens = response.into_tokens(Some("r1".to_string()));
        assert_eq!(tokens.access_token, "a2");
        assert_eq!(tokens.refresh_token.as_deref(), Some("r1"));
        assert!(tokens.expires_at.is_none());
    }

    #[test]
    fn test_token_response_sets_expiry() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","refresh_token":"r","expires_in":3600}"#)
                .unwrap();
        let tokens = response.into_tokens(None);
        assert!(!tokens.is_expired());
        assert!(tokens.expires_at.unwrap() > Utc::now() + Duration::minutes(59));
    }

    #[test]
    fn test_stored_message_keeps_server_id() {
        let stored: StoredMessage = serde_json::from_str(
            r#"{"id":"m1","role":"assistant","content":"Hi","created_at":"2024-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        let message = ChatMessage::from(stored);
        assert_eq!(message.id, "m1");
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.timestamp.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_stored_message_accepts_null_lists() {
        let stored: StoredMessage = serde_json::from_str(
            r#"{"role":"user","content":"q","tool_calls":null,"chart_references":null}"#,
        )
        .unwrap();
        assert!(stored.tool_calls.is_empty());
        assert!(stored.chart_references.is_empty());
    }

    #[test]
    fn test_conversation_detail_flattens_summary() {
        let detail: ConversationDetail = serde_json::from_str(
            r#"{"id":"c1","title":"Venus","created_at":"2024-03-01T10:00:00Z",
                "messages":[{"role":"user","content":"q"}]}"#,
        )
        .unwrap();
        assert_eq!(detail.summary.id, "c1");
        assert_eq!(detail.messages.len(), 1);
    }

    #[test]
    fn test_new_chart_omits_unknown_fields() {
        let chart = NewBirthChart {
            name: "Me".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 4, 12).unwrap(),
            birth_time: None,
            birth_location: "Lisbon".to_string(),
            latitude: None,
            longitude: None,
            timezone: None,
        };
        let value = serde_json::to_value(&chart).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"name":"Me","birth_date":"1990-04-12","birth_location":"Lisbon"})
        );
    }
}
