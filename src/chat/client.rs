//! Async driver for the chat session
//!
//! [`ChatClient`] owns a [`ChatSession`] and runs it on one task. Everything
//! that can change the session arrives on one of four inputs:
//!
//! - commands from any number of [`ChatHandle`] clones
//! - transport events from the current connection
//! - usage snapshots fetched in the background
//! - the session's own reconnect and response deadlines
//!
//! Because the loop handles one input at a time, the session never sees
//! two transitions interleave.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use crate::auth::TokenStore;
use crate::chat::event::{ChatEvent, EventBus};
use crate::chat::message::ChatMessage;
use crate::chat::session::{ChatSession, ConnectionState, SendOutcome};
use crate::chat::transport::{Connector, TransportEventReceiver};
use crate::chat::usage::UsageSnapshot;
use crate::config::Config;
use crate::error::{AstroChatError, Result};

/// Queued commands per client before `ChatHandle` calls start waiting.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Where the client gets the user's message quota from.
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Fetch the current usage for the logged-in user.
    async fn fetch_usage(&self) -> Result<UsageSnapshot>;
}

/// Point-in-time copy of the session state
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSnapshot {
    /// Connection state
    pub state: ConnectionState,
    /// Visible messages, oldest first
    pub messages: Vec<ChatMessage>,
    /// Waiting for an assistant reply
    pub loading: bool,
    /// Bound conversation
    pub conversation_id: Option<String>,
    /// Charts scoping the next message
    pub selected_charts: Vec<String>,
    /// Last known usage
    pub usage: Option<UsageSnapshot>,
    /// Consecutive failed reconnects
    pub reconnect_attempts: u32,
}

impl ChatSnapshot {
    fn capture(session: &ChatSession) -> Self {
        Self {
            state: session.state(),
            messages: session.messages().to_vec(),
            loading: session.is_loading(),
            conversation_id: session.conversation_id().map(str::to_string),
            selected_charts: session.selected_charts(),
            usage: session.usage().cloned(),
            reconnect_attempts: session.reconnect_attempts(),
        }
    }
}

enum ChatCommand {
    Connect,
    Disconnect,
    SetAuthenticated(bool),
    Send {
        text: String,
        reply: oneshot::Sender<SendOutcome>,
    },
    ToggleChart(String),
    ClearCharts,
    Resume {
        conversation_id: String,
        history: Vec<ChatMessage>,
    },
    RefreshUsage,
    Snapshot(oneshot::Sender<ChatSnapshot>),
    Shutdown,
}

/// Cloneable front door to a running [`ChatClient`].
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<ChatCommand>,
    bus: EventBus,
}

impl std::fmt::Debug for ChatHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl ChatHandle {
    async fn submit(&self, command: ChatCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AstroChatError::Transport("chat client has stopped".to_string()).into())
    }

    /// Open the connection (or start a fresh reconnect budget after giving up).
    pub async fn connect(&self) -> Result<()> {
        self.submit(ChatCommand::Connect).await
    }

    /// Close the connection without reconnecting.
    pub async fn disconnect(&self) -> Result<()> {
        self.submit(ChatCommand::Disconnect).await
    }

    /// Tell the client whether the user is logged in.
    pub async fn set_authenticated(&self, authenticated: bool) -> Result<()> {
        self.submit(ChatCommand::SetAuthenticated(authenticated)).await
    }

    /// Send a user message and report what happened to it.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<SendOutcome> {
        let (reply, rx) = oneshot::channel();
        self.submit(ChatCommand::Send {
            text: text.into(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| AstroChatError::Transport("chat client has stopped".to_string()).into())
    }

    /// Select or deselect a chart for the next messages.
    pub async fn toggle_chart(&self, chart_id: impl Into<String>) -> Result<()> {
        self.submit(ChatCommand::ToggleChart(chart_id.into())).await
    }

    /// Deselect every chart.
    pub async fn clear_charts(&self) -> Result<()> {
        self.submit(ChatCommand::ClearCharts).await
    }

    /// Continue a stored conversation.
    pub async fn resume_conversation(
        &self,
        conversation_id: impl Into<String>,
        history: Vec<ChatMessage>,
    ) -> Result<()> {
        self.submit(ChatCommand::Resume {
            conversation_id: conversation_id.into(),
            history,
        })
        .await
    }

    /// Refetch the usage snapshot in the background.
    pub async fn refresh_usage(&self) -> Result<()> {
        self.submit(ChatCommand::RefreshUsage).await
    }

    /// Copy of the current session state.
    pub async fn snapshot(&self) -> Result<ChatSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.submit(ChatCommand::Snapshot(reply)).await?;
        rx.await
            .map_err(|_| AstroChatError::Transport("chat client has stopped".to_string()).into())
    }

    /// Receive every [`ChatEvent`] published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.bus.subscribe()
    }

    /// Close the connection and stop the client loop.
    pub async fn shutdown(&self) -> Result<()> {
        self.submit(ChatCommand::Shutdown).await
    }
}

/// Runs a [`ChatSession`] until shut down.
pub struct ChatClient {
    session: ChatSession,
    commands: mpsc::Receiver<ChatCommand>,
    transport_events: TransportEventReceiver,
    usage_source: Option<Arc<dyn UsageSource>>,
    usage_tx: mpsc::UnboundedSender<UsageSnapshot>,
    usage_rx: mpsc::UnboundedReceiver<UsageSnapshot>,
}

impl ChatClient {
    /// Build a client and the handle that controls it.
    ///
    /// The session starts authenticated when `token_store` already holds
    /// tokens. Nothing happens until [`ChatClient::run`] is awaited.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use astrochat::auth::MemoryTokenStore;
    /// use astrochat::chat::transport::websocket::WebSocketConnector;
    /// use astrochat::chat::ChatClient;
    /// use astrochat::config::Config;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let (client, handle) = ChatClient::new(
    ///     &Config::default(),
    ///     Arc::new(WebSocketConnector::new()),
    ///     Arc::new(MemoryTokenStore::new()),
    /// );
    /// let driver = tokio::spawn(client.run());
    /// handle.send_message("What does my Venus placement mean?").await?;
    /// handle.shutdown().await?;
    /// driver.await??;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        config: &Config,
        connector: Arc<dyn Connector>,
        token_store: Arc<dyn TokenStore>,
    ) -> (Self, ChatHandle) {
        let bus = EventBus::new();
        let (transport_tx, transport_events) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (usage_tx, usage_rx) = mpsc::unbounded_channel();

        let authenticated = match token_store.load() {
            Ok(tokens) => tokens.is_some(),
            Err(e) => {
                tracing::warn!("could not read stored tokens: {}", e);
                false
            }
        };

        let mut session =
            ChatSession::new(config, connector, token_store, transport_tx, bus.clone());
        session.set_authenticated(authenticated);

        let client = Self {
            session,
            commands,
            transport_events,
            usage_source: None,
            usage_tx,
            usage_rx,
        };
        let handle = ChatHandle {
            commands: command_tx,
            bus,
        };
        (client, handle)
    }

    /// Fetch usage snapshots from `source`.
    pub fn with_usage_source(mut self, source: Arc<dyn UsageSource>) -> Self {
        self.usage_source = Some(source);
        self
    }

    /// Drive the session until [`ChatHandle::shutdown`] is called or every
    /// handle is dropped.
    pub async fn run(mut self) -> Result<()> {
        tracing::debug!("chat client started");
        self.refresh_usage();
        self.session.connect();

        loop {
            let deadline = self.session.next_deadline();

            tokio::select! {
                biased;

                Some(envelope) = self.transport_events.recv() => {
                    self.session.handle_transport_event(envelope);
                }
                Some(snapshot) = self.usage_rx.recv() => {
                    self.session.set_usage(snapshot);
                }
                _ = wait_until(deadline) => {
                    self.session.fire_due_timers();
                }
                command = self.commands.recv() => match command {
                    Some(ChatCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }

            if self.session.take_usage_refresh() {
                self.refresh_usage();
            }
        }

        self.session.disconnect();
        tracing::debug!("chat client stopped");
        Ok(())
    }

    fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Connect => self.session.connect(),
            ChatCommand::Disconnect => self.session.disconnect(),
            ChatCommand::SetAuthenticated(authenticated) => {
                let was = self.session.is_authenticated();
                self.session.set_authenticated(authenticated);
                if authenticated && !was {
                    self.refresh_usage();
                    self.session.connect();
                }
            }
            ChatCommand::Send { text, reply } => {
                let outcome = self.session.send_message(&text);
                let _ = reply.send(outcome);
            }
            ChatCommand::ToggleChart(chart_id) => self.session.toggle_chart(&chart_id),
            ChatCommand::ClearCharts => self.session.clear_charts(),
            ChatCommand::Resume {
                conversation_id,
                history,
            } => self.session.resume_conversation(conversation_id, history),
            ChatCommand::RefreshUsage => self.refresh_usage(),
            ChatCommand::Snapshot(reply) => {
                let _ = reply.send(ChatSnapshot::capture(&self.session));
            }
            ChatCommand::Shutdown => {}
        }
    }

    fn refresh_usage(&self) {
        let Some(source) = self.usage_source.clone() else {
            return;
        };
        if !self.session.is_authenticated() {
            return;
        }
        let tx = self.usage_tx.clone();
        tokio::spawn(async move {
            match source.fetch_usage().await {
                Ok(snapshot) => {
                    tracing::debug!(
                        used = snapshot.used,
                        remaining = ?snapshot.messages_remaining(),
                        "usage refreshed"
                    );
                    let _ = tx.send(snapshot);
                }
                Err(e) => tracing::warn!("failed to refresh usage: {}", e),
            }
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthTokens, MemoryTokenStore};
    use crate::chat::transport::fake::FakeConnector;
    use crate::chat::transport::ABNORMAL_CLOSURE;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CountingUsage {
        calls: AtomicU32,
        remaining: u32,
    }

    #[async_trait]
    impl UsageSource for CountingUsage {
        async fn fetch_usage(&self) -> Result<UsageSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(UsageSnapshot::limited(10, self.remaining))
        }
    }

    fn logged_in() -> Arc<MemoryTokenStore> {
        Arc::new(MemoryTokenStore::with_tokens(AuthTokens::new("tok")))
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<ChatEvent>,
        pred: impl Fn(&ChatEvent) -> bool,
    ) -> ChatEvent {
        tokio::time::timeout(Duration::from_secs(300), async {
            loop {
                match rx.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for chat event")
    }

    fn start(
        connector: &FakeConnector,
        store: Arc<MemoryTokenStore>,
    ) -> (ChatHandle, tokio::task::JoinHandle<Result<()>>) {
        let (client, handle) =
            ChatClient::new(&Config::default(), Arc::new(connector.clone()), store);
        (handle, tokio::spawn(client.run()))
    }

    #[tokio::test]
    async fn test_run_connects_when_logged_in() {
        let connector = FakeConnector::new();
        let (handle, driver) = start(&connector, logged_in());

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.state, ConnectionState::Connecting);
        assert_eq!(connector.open_count(), 1);

        let mut rx = handle.subscribe();
        connector.last().open();
        wait_for(&mut rx, |e| *e == ChatEvent::StateChanged(ConnectionState::Connected)).await;

        handle.shutdown().await.unwrap();
        driver.await.unwrap().unwrap();
        assert_eq!(connector.last().closed_with(), Some(1000));
    }

    #[tokio::test]
    async fn test_run_stays_idle_when_logged_out() {
        let connector = FakeConnector::new();
        let (handle, driver) = start(&connector, Arc::new(MemoryTokenStore::new()));

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.state, ConnectionState::Disconnected);
        assert_eq!(connector.open_count(), 0);

        drop(handle);
        driver.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_login_connects() {
        let connector = FakeConnector::new();
        let store = Arc::new(MemoryTokenStore::new());
        let (handle, _driver) = start(&connector, store.clone());

        store.save(&AuthTokens::new("fresh")).unwrap();
        handle.set_authenticated(true).await.unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.state, ConnectionState::Connecting);
        assert!(connector.last().url.as_str().ends_with("token=fresh"));
    }

    #[tokio::test]
    async fn test_send_and_reply_through_handle() {
        let connector = FakeConnector::new();
        let (handle, _driver) = start(&connector, logged_in());
        let mut rx = handle.subscribe();
        handle.snapshot().await.unwrap();
        let conn = connector.last();
        conn.open();
        wait_for(&mut rx, |e| *e == ChatEvent::StateChanged(ConnectionState::Connected)).await;

        handle.toggle_chart("natal-1").await.unwrap();
        let outcome = handle.send_message("Tell me about my rising sign").await.unwrap();
        assert!(matches!(outcome, SendOutcome::Sent(_)));
        assert_eq!(conn.sent().len(), 1);

        conn.frame(json!({"type": "message", "role": "assistant", "content": "Libra rising."}));
        wait_for(&mut rx, |e| *e == ChatEvent::LoadingChanged(false)).await;

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.selected_charts, vec!["natal-1"]);
        assert!(!snap.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_fires_reconnect_timer() {
        let connector = FakeConnector::new();
        let (handle, _driver) = start(&connector, logged_in());
        let mut rx = handle.subscribe();
        handle.snapshot().await.unwrap();

        connector.last().open();
        wait_for(&mut rx, |e| *e == ChatEvent::StateChanged(ConnectionState::Connected)).await;
        connector.last().close(ABNORMAL_CLOSURE);
        wait_for(&mut rx, |e| *e == ChatEvent::StateChanged(ConnectionState::Disconnected)).await;

        let before = Instant::now();
        wait_for(&mut rx, |e| *e == ChatEvent::StateChanged(ConnectionState::Connecting)).await;
        assert!(Instant::now() - before >= Duration::from_secs(1));
        assert_eq!(connector.open_count(), 2);
    }

    #[tokio::test]
    async fn test_usage_fetched_at_start_and_after_limit_error() {
        let connector = FakeConnector::new();
        let usage = Arc::new(CountingUsage {
            calls: AtomicU32::new(0),
            remaining: 4,
        });
        let (client, handle) =
            ChatClient::new(&Config::default(), Arc::new(connector.clone()), logged_in());
        let client = client.with_usage_source(usage.clone());
        let mut rx = handle.subscribe();
        tokio::spawn(client.run());

        wait_for(&mut rx, |e| matches!(e, ChatEvent::UsageUpdated(_))).await;
        assert_eq!(usage.calls.load(Ordering::SeqCst), 1);

        let conn = connector.last();
        conn.open();
        wait_for(&mut rx, |e| *e == ChatEvent::StateChanged(ConnectionState::Connected)).await;
        handle.send_message("one more").await.unwrap();
        conn.frame(json!({"type": "error", "error": "message_limit_exceeded"}));

        wait_for(&mut rx, |e| *e == ChatEvent::UpgradeRequired).await;
        wait_for(&mut rx, |e| matches!(e, ChatEvent::UsageUpdated(_))).await;
        assert_eq!(usage.calls.load(Ordering::SeqCst), 2);

        let snap = handle.snapshot().await.unwrap();
        assert!(snap.messages.is_empty());
        assert_eq!(snap.usage, Some(UsageSnapshot::limited(10, 4)));
    }

    #[tokio::test]
    async fn test_handle_errors_after_shutdown() {
        let connector = FakeConnector::new();
        let (handle, driver) = start(&connector, logged_in());
        handle.shutdown().await.unwrap();
        driver.await.unwrap().unwrap();

        assert!(handle.snapshot().await.is_err());
        assert!(handle.send_message("hello").await.is_err());
    }
}
