//! Observer notifications emitted by the chat session
//!
//! The session never renders anything. It publishes a [`ChatEvent`] for
//! every observable change on a `tokio::sync::broadcast` channel, and any
//! front end (the terminal printer in `commands::chat`, a test) decides
//! how to present it.

use tokio::sync::broadcast;

use crate::chat::message::ChatMessage;
use crate::chat::session::ConnectionState;
use crate::chat::usage::UsageSnapshot;

/// Buffered events per subscriber before the slowest one starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Informational
    Info,
    /// Something went wrong
    Error,
}

/// Something observable changed
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Connection state transition
    StateChanged(ConnectionState),
    /// A message was appended to the list
    MessageAppended(ChatMessage),
    /// A message was rolled back
    MessageRemoved {
        /// Id of the removed message
        id: String,
    },
    /// The awaiting-response flag flipped
    LoadingChanged(bool),
    /// The session is now bound to this conversation
    ConversationBound(String),
    /// Toast-style message for the user
    Notice {
        /// Severity
        level: NoticeLevel,
        /// Text to show
        text: String,
    },
    /// The message quota is used up; offer an upgrade
    UpgradeRequired,
    /// The cached usage snapshot should be refetched
    UsageRefreshRequested,
    /// A fresh usage snapshot was applied
    UsageUpdated(UsageSnapshot),
    /// The selected chart set changed
    ChartsChanged(Vec<String>),
}

/// Fan-out publisher for [`ChatEvent`]s.
///
/// Publishing with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// A bus with [`EVENT_CHANNEL_CAPACITY`] slots per subscriber.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to every current subscriber.
    pub fn emit(&self, event: ChatEvent) {
        let _ = self.tx.send(event);
    }

    /// Shorthand for an error notice.
    pub fn error(&self, text: impl Into<String>) {
        self.emit(ChatEvent::Notice {
            level: NoticeLevel::Error,
            text: text.into(),
        });
    }

    /// Shorthand for an info notice.
    pub fn info(&self, text: impl Into<String>) {
        self.emit(ChatEvent::Notice {
            level: NoticeLevel::Info,
            text: text.into(),
        });
    }

    /// A new receiver that sees every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        EventBus::new().emit(ChatEvent::UpgradeRequired);
    }

    #[test]
    fn test_subscribers_see_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(ChatEvent::LoadingChanged(true));
        bus.error("boom");

        assert_eq!(rx.try_recv().unwrap(), ChatEvent::LoadingChanged(true));
        assert_eq!(
            rx.try_recv().unwrap(),
            ChatEvent::Notice {
                level: NoticeLevel::Error,
                text: "boom".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
