//! Chat transport abstraction and implementations
//!
//! This module defines the seam between the chat session state machine and
//! the network:
//!
//! - [`Connector`] constructs a connection. Construction is synchronous, like
//!   a browser `WebSocket` constructor: a malformed target fails right away,
//!   while the handshake completes in the background and is reported later.
//! - [`Transport`] is the live handle the session owns. `send` fails once the
//!   underlying writer is gone; that is the "transmit threw" case the session
//!   rolls back on.
//! - [`TransportEvent`]s (`Opened`, `Frame`, `Closed`) flow back to the
//!   driver on an unbounded channel, tagged with the connection generation so
//!   events from a replaced connection can be discarded.
//!
//! Implementations:
//!
//! - [`websocket::WebSocketConnector`] -- `tokio-tungstenite` client.
//! - `fake::FakeConnector` -- in-process fake used in tests (cfg(test)
//!   only).

use tokio::sync::mpsc;
use url::Url;

use crate::error::{AstroChatError, Result};

pub mod websocket;

#[cfg(test)]
pub mod fake;

/// Close code for an orderly shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when a connection ends without a close frame or
/// never opens.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Something happened on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed
    Opened,
    /// One inbound text frame
    Frame(String),
    /// The connection is gone
    Closed {
        /// WebSocket close code
        code: u16,
        /// Close reason or failure description
        reason: String,
    },
}

/// A [`TransportEvent`] tagged with the connection it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEnvelope {
    /// Generation number handed to [`Connector::open`]
    pub generation: u64,
    /// The event
    pub event: TransportEvent,
}

/// Sending half of the transport event channel.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEnvelope>;

/// Receiving half of the transport event channel.
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEnvelope>;

/// A live (or opening) connection owned by the chat session.
pub trait Transport: Send + std::fmt::Debug {
    /// Queue one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`AstroChatError::Transport`] when the connection has already
    /// gone away.
    fn send(&self, frame: String) -> Result<()>;

    /// Start closing the connection with the given close code.
    fn close(&self, code: u16);
}

/// Opens connections to the chat endpoint.
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Begin opening a connection to `url`.
    ///
    /// Every event for this connection must be published on `events`
    /// wrapped in a [`TransportEnvelope`] carrying `generation`.
    ///
    /// # Errors
    ///
    /// Returns [`AstroChatError::Transport`] when the connection cannot even
    /// be constructed (bad URL, no runtime). Such failures are not retried.
    fn open(
        &self,
        url: &Url,
        generation: u64,
        events: TransportEventSender,
    ) -> Result<Box<dyn Transport>>;
}

/// Build the chat endpoint URL from the REST base URL.
///
/// The scheme is upgraded (`http` -> `ws`, `https` -> `wss`), `ws_path` is
/// appended to any path the base already has, and the bearer token travels
/// as the `token` query parameter because browser handshakes cannot carry
/// an `Authorization` header.
///
/// # Errors
///
/// Returns an error when `base_url` does not parse or is not http(s).
///
/// # Examples
///
/// ```
/// use astrochat::chat::transport::build_chat_url;
///
/// let url = build_chat_url("https://api.example.com", "/api/chat/ws", "abc").unwrap();
/// assert_eq!(url.as_str(), "wss://api.example.com/api/chat/ws?token=abc");
/// ```
pub fn build_chat_url(base_url: &str, ws_path: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;

    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(AstroChatError::Transport(format!(
                "unsupported API scheme for chat: {}",
                other
            ))
            .into())
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AstroChatError::Transport(format!("cannot switch scheme to {}", scheme)))?;

    let path = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        ws_path.trim_start_matches('/')
    );
    url.set_path(&path);
    url.set_query(None);
    url.query_pairs_mut().append_pair("token", token);

    Ok(url)
}

/// Render a chat URL for logs with the token value masked.
pub fn redact_token(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "token" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    redacted.set_query(None);
    if !pairs.is_empty() {
        redacted.query_pairs_mut().extend_pairs(pairs);
    }
    redacted.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_becomes_ws() {
        let url = build_chat_url("http://localhost:8000", "/api/chat/ws", "t").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/api/chat/ws?token=t");
    }

    #[test]
    fn test_base_path_is_preserved() {
        let url = build_chat_url("https://example.com/backend/", "/api/chat/ws", "t").unwrap();
        assert_eq!(url.as_str(), "wss://example.com/backend/api/chat/ws?token=t");
    }

    #[test]
    fn test_token_is_query_encoded() {
        let url = build_chat_url("https://example.com", "/ws", "a b&c").unwrap();
        let token = url
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned());
        assert_eq!(token.as_deref(), Some("a b&c"));
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        assert!(build_chat_url("ftp://example.com", "/ws", "t").is_err());
    }

    #[test]
    fn test_malformed_base_rejected() {
        assert!(build_chat_url("::not a url::", "/ws", "t").is_err());
    }

    #[test]
    fn test_redact_token_masks_value() {
        let url = build_chat_url("https://example.com", "/ws", "secret").unwrap();
        let shown = redact_token(&url);
        assert!(!shown.contains("secret"));
        assert!(shown.contains("token=***") || shown.contains("token=%2A%2A%2A"));
    }
}
