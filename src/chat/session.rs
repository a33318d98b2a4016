//! Chat session state machine
//!
//! [`ChatSession`] owns the one chat connection, the visible message list,
//! the send path and the reconnect timer. Every transition is a synchronous
//! method; nothing here awaits. The async driver
//! ([`crate::chat::client::ChatClient`]) calls these methods from a single
//! task, which is all the serialization the state needs.
//!
//! Connection lifecycle:
//!
//! ```text
//!             connect()                on_open()
//! Disconnected ---------> Connecting -----------> Connected
//!      ^   ^                  |                       |
//!      |   |  timer fires     | on_close(abnormal)    | on_close(abnormal)
//!      |   +------------------+-----------------------+  attempts <= max
//!      |                      |                       |
//!      | disconnect() / 1000  v  attempts > max       v
//!      +------------------  Error  <------------------+
//! ```
//!
//! Send path: `send_message` appends the user message optimistically and
//! sets the loading flag before transmitting. An assistant `message` frame
//! resolves it, a `message_limit_exceeded` error frame rolls it back, and a
//! transmit failure rolls it back immediately.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::auth::TokenStore;
use crate::chat::event::{ChatEvent, EventBus};
use crate::chat::frame::{ClientFrame, ServerFrame};
use crate::chat::message::{ChatMessage, Role};
use crate::chat::reconnect::ReconnectPolicy;
use crate::chat::transport::{
    build_chat_url, redact_token, Connector, Transport, TransportEnvelope, TransportEvent,
    TransportEventSender, NORMAL_CLOSURE,
};
use crate::chat::usage::{UsageGate, UsageSnapshot};
use crate::config::Config;

/// Connection status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting,
    /// Ready to send
    Connected,
    /// No connection (idle, closed, or waiting to reconnect)
    Disconnected,
    /// Gave up; needs a manual reconnect
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// What became of a `send_message` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Transmitted; carries the optimistic message id
    Sent(String),
    /// Nothing but whitespace; ignored
    Empty,
    /// No open connection; a reconnect was started instead
    NotConnected,
    /// The cached usage says the quota is spent; nothing was sent
    LimitReached,
    /// The transmit call failed and the optimistic message was rolled back
    Failed,
}

/// An optimistic message awaiting an assistant reply.
#[derive(Debug, Clone)]
struct PendingSend {
    message_id: String,
    deadline: Option<Instant>,
}

/// Chat connection manager and message reducer.
pub struct ChatSession {
    base_url: String,
    ws_path: String,
    policy: ReconnectPolicy,
    response_timeout: Option<Duration>,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenStore>,
    transport_events: TransportEventSender,
    bus: EventBus,

    authenticated: bool,
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    generation: u64,
    manual_close: bool,
    reconnect_attempts: u32,
    reconnect_at: Option<Instant>,

    messages: Vec<ChatMessage>,
    loading: bool,
    /// Sends awaiting a reply, oldest first.
    pending: VecDeque<PendingSend>,
    conversation_id: Option<String>,
    selected_charts: BTreeSet<String>,
    usage: UsageGate,
    usage_refresh_requested: bool,
}

impl ChatSession {
    /// A disconnected, unauthenticated session.
    ///
    /// # Arguments
    ///
    /// * `config` - Supplies the API base URL, chat path, backoff and
    ///   response timeout
    /// * `connector` - Opens transports
    /// * `tokens` - Source of the bearer token for the handshake
    /// * `transport_events` - Channel every opened transport reports on
    /// * `bus` - Where observer notifications go
    pub fn new(
        config: &Config,
        connector: Arc<dyn Connector>,
        tokens: Arc<dyn TokenStore>,
        transport_events: TransportEventSender,
        bus: EventBus,
    ) -> Self {
        Self {
            base_url: config.api.base_url.clone(),
            ws_path: config.chat.ws_path.clone(),
            policy: ReconnectPolicy::from(&config.chat.reconnect),
            response_timeout: config.chat.response_timeout(),
            connector,
            tokens,
            transport_events,
            bus,
            authenticated: false,
            state: ConnectionState::Disconnected,
            transport: None,
            generation: 0,
            manual_close: false,
            reconnect_attempts: 0,
            reconnect_at: None,
            messages: Vec::new(),
            loading: false,
            pending: VecDeque::new(),
            conversation_id: None,
            selected_charts: BTreeSet::new(),
            usage: UsageGate::new(),
            usage_refresh_requested: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Visible messages, oldest first
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// `true` while waiting for an assistant reply
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Server-assigned conversation, once known
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Charts that will scope the next message
    pub fn selected_charts(&self) -> Vec<String> {
        self.selected_charts.iter().cloned().collect()
    }

    /// Last fetched usage snapshot
    pub fn usage(&self) -> Option<&UsageSnapshot> {
        self.usage.snapshot()
    }

    /// Whether the usage gate would let a message through
    pub fn can_send(&self) -> bool {
        self.usage.can_send()
    }

    /// Consecutive abnormal closes since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Whether the session believes the user is logged in
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// A receiver for this session's events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ChatEvent> {
        self.bus.subscribe()
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Record a change in the auth context.
    ///
    /// Losing authentication tears the connection down as a manual close.
    pub fn set_authenticated(&mut self, authenticated: bool) {
        let was = self.authenticated;
        self.authenticated = authenticated;
        if was && !authenticated {
            tracing::info!("authentication lost, closing chat connection");
            self.disconnect();
        }
    }

    /// Open the chat connection (manual trigger).
    ///
    /// A no-op while a connection is opening or open, or while
    /// unauthenticated. Calling this after the reconnect budget was
    /// exhausted starts a fresh budget.
    pub fn connect(&mut self) {
        if self.state == ConnectionState::Error {
            self.reconnect_attempts = 0;
        }
        self.open_connection();
    }

    fn open_connection(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            tracing::debug!(state = %self.state, "connect skipped: connection already active");
            return;
        }
        if !self.authenticated {
            tracing::debug!("connect skipped: not authenticated");
            return;
        }

        self.reconnect_at = None;
        self.manual_close = false;

        let token = match self.tokens.load() {
            Ok(Some(tokens)) if !tokens.is_expired() => tokens.access_token,
            Ok(Some(_)) => {
                tracing::warn!("stored access token has expired");
                self.fail("Your session has expired. Please log in again.");
                return;
            }
            Ok(None) => {
                tracing::warn!("no access token available for chat");
                self.fail("Please log in again to use chat.");
                return;
            }
            Err(e) => {
                tracing::error!("failed to read stored tokens: {}", e);
                self.fail("Please log in again to use chat.");
                return;
            }
        };

        let url = match build_chat_url(&self.base_url, &self.ws_path, &token) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("invalid chat URL: {}", e);
                self.fail(format!("Failed to connect to chat: {}", e));
                return;
            }
        };

        self.generation += 1;
        self.set_state(ConnectionState::Connecting);
        tracing::info!(url = %redact_token(&url), generation = self.generation, "opening chat connection");

        match self
            .connector
            .open(&url, self.generation, self.transport_events.clone())
        {
            Ok(transport) => self.transport = Some(transport),
            Err(e) => {
                tracing::error!("failed to construct chat connection: {}", e);
                self.fail(format!("Failed to connect to chat: {}", e));
            }
        }
    }

    /// Close the connection on purpose. Never triggers a reconnect.
    ///
    /// An optimistic message still awaiting a reply stays in the list.
    pub fn disconnect(&mut self) {
        self.manual_close = true;
        self.reconnect_at = None;
        if let Some(transport) = self.transport.take() {
            tracing::info!("closing chat connection");
            transport.close(NORMAL_CLOSURE);
        }
        self.pending.clear();
        self.set_loading(false);
        self.set_state(ConnectionState::Disconnected);
    }

    /// Route one transport event to the matching handler.
    ///
    /// Events from a connection other than the current one are dropped.
    pub fn handle_transport_event(&mut self, envelope: TransportEnvelope) {
        if envelope.generation != self.generation {
            tracing::debug!(
                stale = envelope.generation,
                current = self.generation,
                "ignoring event from replaced connection"
            );
            return;
        }
        match envelope.event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Frame(text) => self.on_frame(&text),
            TransportEvent::Closed { code, reason } => self.on_close(code, &reason),
        }
    }

    /// Handshake completed.
    pub fn on_open(&mut self) {
        if self.transport.is_none() {
            tracing::debug!("open reported after close, ignoring");
            return;
        }
        tracing::info!("chat connected");
        self.reconnect_attempts = 0;
        self.set_state(ConnectionState::Connected);
    }

    /// The connection ended with `code`.
    pub fn on_close(&mut self, code: u16, reason: &str) {
        self.transport = None;
        self.pending.clear();
        self.set_loading(false);

        if self.manual_close {
            tracing::debug!(code, "chat closed manually");
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        if code == NORMAL_CLOSURE {
            tracing::info!("chat closed normally");
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        self.reconnect_attempts += 1;
        match self.policy.delay_for(self.reconnect_attempts) {
            Some(delay) => {
                tracing::warn!(
                    code,
                    reason,
                    attempt = self.reconnect_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "chat connection lost, scheduling reconnect"
                );
                self.reconnect_at = Some(Instant::now() + delay);
                self.set_state(ConnectionState::Disconnected);
            }
            None => {
                tracing::error!(
                    code,
                    attempts = self.reconnect_attempts - 1,
                    "chat reconnect attempts exhausted"
                );
                self.reconnect_at = None;
                self.set_state(ConnectionState::Error);
                self.bus
                    .error("Lost connection to the chat server. Please reconnect to continue.");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Earliest instant at which [`ChatSession::fire_due_timers`] has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        let response = self.pending.iter().filter_map(|p| p.deadline).min();
        match (self.reconnect_at, response) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// When the scheduled reconnect will run, if one is pending.
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Run whichever timers are due.
    pub fn fire_due_timers(&mut self) {
        let now = Instant::now();

        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            tracing::info!(attempt = self.reconnect_attempts, "reconnecting to chat");
            self.open_connection();
        }

        let mut timed_out = false;
        while self
            .pending
            .front()
            .and_then(|p| p.deadline)
            .is_some_and(|deadline| deadline <= now)
        {
            if let Some(pending) = self.pending.pop_front() {
                tracing::warn!(message_id = %pending.message_id, "assistant reply timed out");
                self.remove_message(&pending.message_id);
                timed_out = true;
            }
        }
        if timed_out {
            self.settle_loading();
            self.bus
                .error("The astrologer took too long to respond. Please try again.");
        }
    }

    // -----------------------------------------------------------------------
    // Frames
    // -----------------------------------------------------------------------

    /// Apply one inbound text frame.
    pub fn on_frame(&mut self, text: &str) {
        if self.transport.is_none() {
            tracing::debug!("frame after close, ignoring");
            return;
        }

        let frame = match ServerFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("failed to parse chat frame: {}", e);
                self.bus.error("Received an unreadable message from the server.");
                return;
            }
        };
        tracing::debug!(?frame, "chat frame");

        match frame {
            ServerFrame::Connected { message, user_id } => {
                tracing::info!(
                    user_id = user_id.as_deref().unwrap_or("-"),
                    "server greeting: {}",
                    message.as_deref().unwrap_or("")
                );
            }
            ServerFrame::ConversationCreated { conversation_id } => {
                self.bind_conversation(conversation_id);
            }
            ServerFrame::Message {
                role,
                content,
                conversation_id,
                tool_calls,
                chart_references,
            } => {
                if self.conversation_id.is_none() {
                    if let Some(id) = conversation_id {
                        self.bind_conversation(id);
                    }
                }
                let message = ChatMessage::new(role, content)
                    .with_tool_calls(tool_calls)
                    .with_chart_references(chart_references);
                self.append(message);
                if role == Role::Assistant {
                    self.pending.pop_front();
                    self.settle_loading();
                }
            }
            frame @ ServerFrame::Error { .. } if frame.is_limit_exceeded() => {
                self.on_limit_exceeded();
            }
            ServerFrame::Error { error, message, .. } => {
                tracing::warn!(error = %error, "chat server error");
                // The server may still be working on the message; keep it.
                self.pending.pop_front();
                self.settle_loading();
                self.bus.error(message.unwrap_or(error));
            }
            ServerFrame::Unknown => {
                tracing::debug!("ignoring unknown frame type");
            }
        }
    }

    fn on_limit_exceeded(&mut self) {
        tracing::info!("server rejected message: limit exceeded");

        // The rejection answers the oldest send still in flight.
        let rollback = match self.pending.pop_front() {
            Some(pending) => Some(pending.message_id),
            None => self
                .messages
                .last()
                .filter(|m| m.role == Role::User)
                .map(|m| m.id.clone()),
        };
        if let Some(id) = rollback {
            self.remove_message(&id);
        }
        self.settle_loading();

        self.request_usage_refresh();
        self.bus.emit(ChatEvent::UpgradeRequired);
        self.bus
            .error("You've reached your message limit. Upgrade your plan to keep chatting.");
    }

    fn bind_conversation(&mut self, conversation_id: String) {
        if self.conversation_id.as_deref() == Some(conversation_id.as_str()) {
            return;
        }
        tracing::info!(conversation_id = %conversation_id, "bound to conversation");
        self.conversation_id = Some(conversation_id.clone());
        self.bus.emit(ChatEvent::ConversationBound(conversation_id));
    }

    // -----------------------------------------------------------------------
    // Send path
    // -----------------------------------------------------------------------

    /// Send a user message.
    pub fn send_message(&mut self, text: &str) -> SendOutcome {
        let content = text.trim();
        if content.is_empty() {
            return SendOutcome::Empty;
        }

        if self.state != ConnectionState::Connected || self.transport.is_none() {
            tracing::info!(state = %self.state, "send while not connected, reconnecting");
            self.bus.error("Not connected to chat. Reconnecting...");
            self.connect();
            return SendOutcome::NotConnected;
        }

        if !self.usage.can_send() {
            tracing::info!("send blocked by usage gate");
            self.bus.emit(ChatEvent::UpgradeRequired);
            self.bus
                .error("You've reached your message limit. Upgrade your plan to keep chatting.");
            return SendOutcome::LimitReached;
        }

        let charts = self.selected_charts();
        let frame = ClientFrame::Message {
            content: content.to_string(),
            conversation_id: self.conversation_id.clone(),
            chart_references: charts.clone(),
        };
        let message = ChatMessage::new(Role::User, content).with_chart_references(charts);
        let message_id = message.id.clone();

        self.append(message);
        self.set_loading(true);

        let transmitted = match self.transport.as_ref() {
            Some(transport) => frame.encode().and_then(|payload| transport.send(payload)),
            None => Err(crate::error::AstroChatError::NotConnected.into()),
        };

        match transmitted {
            Ok(()) => {
                tracing::debug!(message_id = %message_id, "message sent");
                self.pending.push_back(PendingSend {
                    message_id: message_id.clone(),
                    deadline: self.response_timeout.map(|t| Instant::now() + t),
                });
                SendOutcome::Sent(message_id)
            }
            Err(e) => {
                tracing::warn!("failed to send chat message: {}", e);
                self.remove_message(&message_id);
                self.settle_loading();
                self.bus.error("Failed to send message. Please try again.");
                SendOutcome::Failed
            }
        }
    }

    // -----------------------------------------------------------------------
    // Charts, usage, history
    // -----------------------------------------------------------------------

    /// Add the chart to the selection, or remove it if already selected.
    pub fn toggle_chart(&mut self, chart_id: &str) {
        if !self.selected_charts.remove(chart_id) {
            self.selected_charts.insert(chart_id.to_string());
        }
        self.bus.emit(ChatEvent::ChartsChanged(self.selected_charts()));
    }

    /// Empty the chart selection.
    pub fn clear_charts(&mut self) {
        if self.selected_charts.is_empty() {
            return;
        }
        self.selected_charts.clear();
        self.bus.emit(ChatEvent::ChartsChanged(Vec::new()));
    }

    /// Replace the cached usage snapshot.
    pub fn set_usage(&mut self, snapshot: UsageSnapshot) {
        self.usage.update(snapshot.clone());
        self.bus.emit(ChatEvent::UsageUpdated(snapshot));
    }

    fn request_usage_refresh(&mut self) {
        self.usage_refresh_requested = true;
        self.bus.emit(ChatEvent::UsageRefreshRequested);
    }

    /// Returns and clears the pending usage-refresh request.
    pub fn take_usage_refresh(&mut self) -> bool {
        std::mem::take(&mut self.usage_refresh_requested)
    }

    /// Continue an existing conversation with its stored history.
    ///
    /// Only allowed before anything has been said in this session.
    pub fn resume_conversation(&mut self, conversation_id: String, history: Vec<ChatMessage>) {
        if !self.messages.is_empty() {
            tracing::warn!("resume ignored: session already has messages");
            return;
        }
        self.bind_conversation(conversation_id);
        for message in history {
            self.append(message);
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn append(&mut self, message: ChatMessage) {
        self.messages.push(message.clone());
        self.bus.emit(ChatEvent::MessageAppended(message));
    }

    fn remove_message(&mut self, id: &str) {
        if let Some(pos) = self.messages.iter().rposition(|m| m.id == id) {
            self.messages.remove(pos);
            self.bus.emit(ChatEvent::MessageRemoved { id: id.to_string() });
        }
    }

    fn set_loading(&mut self, loading: bool) {
        if self.loading != loading {
            self.loading = loading;
            self.bus.emit(ChatEvent::LoadingChanged(loading));
        }
    }

    /// Loading stays set while any send is still awaiting its reply.
    fn settle_loading(&mut self) {
        self.set_loading(!self.pending.is_empty());
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "chat state change");
            self.state = state;
            self.bus.emit(ChatEvent::StateChanged(state));
        }
    }

    fn fail(&mut self, text: impl Into<String>) {
        self.transport = None;
        self.set_state(ConnectionState::Error);
        self.bus.error(text);
    }
}
