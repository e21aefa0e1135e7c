//! Real-time connection driver.
//!
//! The driver owns the WebSocket returned by the bootstrap handshake. A
//! background task decodes every text frame into an [`InboundMessage`] and
//! pushes it onto the event queue. When the peer closes the socket (or the
//! stream fails) a single [`Event::ConnectionClosed`] is enqueued and the task
//! exits; there is no reconnect.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use glados_core::{Event, EventSender, InboundMessage, TransportError, TransportResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Close code reported when the stream ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// State of the reader task.
struct ReaderState {
    events: EventSender,
    ws_tx: WsSink,
    ws_rx: WsSource,
}

impl ReaderState {
    fn new(events: EventSender, stream: WsStream) -> Self {
        let (ws_tx, ws_rx) = stream.split();
        Self {
            events,
            ws_tx,
            ws_rx,
        }
    }

    fn handle_text(&self, text: &str) {
        trace!(len = text.len(), "Received frame");
        match InboundMessage::from_json(text) {
            Ok(msg) => {
                if self.events.send(Event::Inbound(msg)).is_err() {
                    debug!("Event queue closed, dropping frame");
                }
            }
            Err(e) => warn!(error = %e, "Dropping malformed frame"),
        }
    }

    fn report_closed(&self, frame: Option<CloseFrame>) {
        let (code, reason) = match frame {
            Some(frame) => {
                let reason = frame.reason.as_str();
                (
                    u16::from(frame.code),
                    (!reason.is_empty()).then(|| reason.to_string()),
                )
            }
            None => (ABNORMAL_CLOSURE, None),
        };
        info!(code, reason = ?reason, "Connection closed by peer");
        let _ = self.events.send(Event::ConnectionClosed { code, reason });
    }

    /// Handles one stream item. Returns `false` once the connection is gone.
    async fn handle_message(&mut self, msg: Option<Result<Message, Error>>) -> bool {
        match msg {
            Some(Ok(Message::Text(text))) => {
                self.handle_text(text.as_str());
                true
            }
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    self.handle_text(text);
                    true
                }
                Err(_) => {
                    warn!(len = data.len(), "Dropping non-UTF-8 binary frame");
                    true
                }
            },
            Some(Ok(Message::Ping(data))) => {
                trace!("Received ping, sending pong");
                let _ = self.ws_tx.send(Message::Pong(data)).await;
                true
            }
            Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => true,
            Some(Ok(Message::Close(frame))) => {
                self.report_closed(frame);
                false
            }
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket error");
                self.report_closed(None);
                false
            }
            None => {
                self.report_closed(None);
                false
            }
        }
    }
}

/// Handle to the background reader task.
pub struct ConnectionDriver {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionDriver {
    /// Opens the WebSocket at `url` and starts forwarding frames to `events`.
    pub async fn start(url: &str, events: EventSender) -> TransportResult<Self> {
        info!(url = %url, "Connecting to real-time endpoint");
        let (stream, _response) =
            connect_async(url)
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    url: url.to_string(),
                    reason: format!("WebSocket connection failed: {}", e),
                })?;
        info!("Real-time connection established");

        Ok(Self::spawn(stream, events))
    }

    fn spawn(stream: WsStream, events: EventSender) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut state = ReaderState::new(events, stream);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Connection driver stopping");
                        let _ = state.ws_tx.close().await;
                        break;
                    }
                    msg = state.ws_rx.next() => {
                        if !state.handle_message(msg).await {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Whether the reader task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Closes the socket and waits for the reader task. Safe to call twice.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Connection driver task failed");
            }
        }
    }
}

impl Drop for ConnectionDriver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
