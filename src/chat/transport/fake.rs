//! In-process fake connector for chat unit tests
//!
//! [`FakeConnector`] records every connection the session asks for and hands
//! back a [`FakeConnection`] per open, which the test uses to:
//!
//! - inject server-side events: `conn.open()`, `conn.frame(json)`,
//!   `conn.close(code)`
//! - read what the session sent: `conn.sent()`
//! - make the next transmit throw: `conn.fail_sends()`
//!
//! Events are published on the same channel a real connector would use, so
//! the test drains the receiver and feeds envelopes to the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use url::Url;

use crate::chat::transport::{
    Connector, Transport, TransportEnvelope, TransportEvent, TransportEventSender,
};
use crate::error::{AstroChatError, Result};

/// Connector that never touches the network.
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    connections: Arc<Mutex<Vec<FakeConnection>>>,
    fail_open: Arc<AtomicBool>,
}

impl FakeConnector {
    /// A connector whose opens succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `open` fail at construction time.
    pub fn fail_opens(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    /// How many transports have been constructed.
    pub fn open_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// The most recently constructed connection.
    pub fn last(&self) -> FakeConnection {
        self.connections
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection has been opened")
    }
}

impl Connector for FakeConnector {
    fn open(
        &self,
        url: &Url,
        generation: u64,
        events: TransportEventSender,
    ) -> Result<Box<dyn Transport>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(AstroChatError::Transport("fake construction failure".to_string()).into());
        }
        let conn = FakeConnection {
            url: url.clone(),
            generation,
            events,
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_sends: Arc::new(AtomicBool::new(false)),
            closed_with: Arc::new(Mutex::new(None)),
        };
        self.connections.lock().unwrap().push(conn.clone());
        Ok(Box::new(FakeTransport { conn }))
    }
}

/// Test-side view of one fake connection.
#[derive(Debug, Clone)]
pub struct FakeConnection {
    /// URL the session asked for
    pub url: Url,
    /// Generation the session assigned
    pub generation: u64,
    events: TransportEventSender,
    sent: Arc<Mutex<Vec<String>>>,
    fail_sends: Arc<AtomicBool>,
    closed_with: Arc<Mutex<Option<u16>>>,
}

impl FakeConnection {
    fn push(&self, event: TransportEvent) {
        self.events
            .send(TransportEnvelope {
                generation: self.generation,
                event,
            })
            .expect("transport event receiver dropped");
    }

    /// Simulate the handshake completing.
    pub fn open(&self) {
        self.push(TransportEvent::Opened);
    }

    /// Simulate an inbound frame built from a JSON value.
    pub fn frame(&self, value: serde_json::Value) {
        self.push(TransportEvent::Frame(value.to_string()));
    }

    /// Simulate an inbound raw text frame.
    pub fn raw(&self, text: &str) {
        self.push(TransportEvent::Frame(text.to_string()));
    }

    /// Simulate the server closing with `code`.
    pub fn close(&self, code: u16) {
        self.push(TransportEvent::Closed {
            code,
            reason: String::new(),
        });
    }

    /// Every frame the session transmitted, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Make later `send` calls fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Close code the session closed with, if it did.
    pub fn closed_with(&self) -> Option<u16> {
        *self.closed_with.lock().unwrap()
    }
}

#[derive(Debug)]
struct FakeTransport {
    conn: FakeConnection,
}

impl Transport for FakeTransport {
    fn send(&self, frame: String) -> Result<()> {
        if self.conn.fail_sends.load(Ordering::SeqCst) {
            return Err(AstroChatError::Transport("connection dropped".to_string()).into());
        }
        self.conn.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn close(&self, code: u16) {
        *self.conn.closed_with.lock().unwrap() = Some(code);
    }
}
