//! WebSocket transport built on `tokio-tungstenite`
//!
//! [`WebSocketConnector::open`] validates the target and spawns one Tokio
//! task per connection. The task performs the handshake, then pumps:
//!
//! - outbound text queued through [`WebSocketTransport::send`] into the sink
//! - inbound text frames into the session's event channel
//!
//! The task reports exactly one `Closed` event when it ends. Handshake
//! failures, socket errors and a stream that ends without a close frame are
//! all reported as [`ABNORMAL_CLOSURE`] so the session's reconnect policy
//! applies to them.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::chat::transport::{
    redact_token, Connector, Transport, TransportEnvelope, TransportEvent, TransportEventSender,
    ABNORMAL_CLOSURE, NORMAL_CLOSURE,
};
use crate::error::{AstroChatError, Result};

/// Close code reported when the peer sends a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens `ws://` / `wss://` connections.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// A new connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn open(
        &self,
        url: &Url,
        generation: u64,
        events: TransportEventSender,
    ) -> Result<Box<dyn Transport>> {
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(AstroChatError::Transport(format!(
                "chat URL must use ws or wss, got: {}",
                url.scheme()
            ))
            .into());
        }

        let request = url.as_str().into_client_request().map_err(|e| {
            AstroChatError::Transport(format!("Failed to build WebSocket request: {}", e))
        })?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            AstroChatError::Transport(format!("no async runtime to drive the connection: {}", e))
        })?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tracing::debug!(url = %redact_token(url), generation, "spawning chat socket task");
        runtime.spawn(run_socket(request, generation, events, outbound_rx));

        Ok(Box::new(WebSocketTransport { outbound_tx }))
    }
}

/// Work queued for the socket task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close(u16),
}

/// Handle to a connection opened by [`WebSocketConnector`].
///
/// Dropping the handle closes the connection with [`NORMAL_CLOSURE`].
#[derive(Debug)]
pub struct WebSocketTransport {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
}

impl Transport for WebSocketTransport {
    fn send(&self, frame: String) -> Result<()> {
        self.outbound_tx
            .send(Outbound::Text(frame))
            .map_err(|_| AstroChatError::Transport("connection is closed".to_string()).into())
    }

    fn close(&self, code: u16) {
        let _ = self.outbound_tx.send(Outbound::Close(code));
    }
}

async fn run_socket(
    request: Request,
    generation: u64,
    events: TransportEventSender,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send(TransportEnvelope { generation, event });
    };

    let ws = match tokio_tungstenite::connect_async(request).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            tracing::warn!(generation, "chat handshake failed: {}", e);
            emit(TransportEvent::Closed {
                code: ABNORMAL_CLOSURE,
                reason: format!("Connection failed: {}", e),
            });
            return;
        }
    };

    emit(TransportEvent::Opened);
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => match outbound {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::warn!(generation, "chat send failed: {}", e);
                        emit(TransportEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: e.to_string(),
                        });
                        return;
                    }
                }
                Some(Outbound::Close(code)) => {
                    close_sink(&mut sink, code).await;
                    emit(TransportEvent::Closed {
                        code,
                        reason: "closed by client".to_string(),
                    });
                    return;
                }
                None => {
                    // Every handle is gone.
                    close_sink(&mut sink, NORMAL_CLOSURE).await;
                    return;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => emit(TransportEvent::Frame(text.to_string())),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => emit(TransportEvent::Frame(text)),
                    Err(_) => tracing::debug!(generation, "dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    tracing::info!(generation, code, "chat server closed the connection");
                    emit(TransportEvent::Closed { code, reason });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(generation, "chat socket error: {}", e);
                    emit(TransportEvent::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: e.to_string(),
                    });
                    return;
                }
                None => {
                    emit(TransportEvent::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: "stream ended".to_string(),
                    });
                    return;
                }
            },
        }
    }
}

async fn close_sink<S>(sink: &mut S, code: u16)
where
    S: futures::Sink<Message> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: "".into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_ws_scheme() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let url = Url::parse("http://localhost/ws").unwrap();
        let err = WebSocketConnector::new().open(&url, 1, tx).unwrap_err();
        assert!(err.to_string().contains("ws or wss"));
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_abnormal_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        // Port 9 (discard) on loopback is closed on any sane test machine.
        let url = Url::parse("ws://127.0.0.1:9/ws?token=t").unwrap();
        let _transport = WebSocketConnector::new().open(&url, 7, tx).unwrap();

        let envelope = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for close")
            .expect("channel closed");
        assert_eq!(envelope.generation, 7);
        assert!(matches!(
            envelope.event,
            TransportEvent::Closed { code: ABNORMAL_CLOSURE, .. }
        ));
    }

    #[test]
    fn test_open_without_runtime_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let url = Url::parse("ws://localhost/ws").unwrap();
        let err = WebSocketConnector::new().open(&url, 1, tx).unwrap_err();
        assert!(err.to_string().contains("runtime"));
    }
}
