//! WebSocket signaling client.
//!
//! Maintains the persistent connection to the relay: a background reader
//! task decodes [`ServerEvent`] frames into a channel, and typed send
//! helpers encode [`ClientEvent`] frames onto the socket. The client
//! holds no negotiation state; that lives in [`crate::session`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use roomcast_proto::signal::{self, ClientEvent, CodecError, ServerEvent};

use crate::transport::{Candidate, Sdp};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for connecting to the relay server.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the signaling connection.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    /// The connection to the relay is gone.
    #[error("connection to relay closed")]
    ConnectionClosed,

    /// Connecting to the relay timed out.
    #[error("signaling connect timed out")]
    Timeout,

    /// The relay could not be reached.
    #[error("failed to reach relay: {0}")]
    Connect(String),

    /// A frame could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Generates a fresh opaque participant token.
///
/// Tokens are client-chosen and carry no meaning to the relay; peers use
/// them to tell presence announcements apart.
#[must_use]
pub fn participant_token() -> String {
    Uuid::now_v7().to_string()
}

/// Persistent signaling connection to a roomcast relay.
///
/// Created via [`SignalingClient::connect`], which establishes the
/// WebSocket connection and spawns a background reader task. Events are
/// consumed one at a time through [`SignalingClient::next_event`].
pub struct SignalingClient {
    /// Write half of the WebSocket connection.
    ws_sender: Arc<Mutex<WsSender>>,
    /// Channel fed by the background reader task.
    events: mpsc::Receiver<ServerEvent>,
    /// Whether the WebSocket connection to the relay is active.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task.
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl SignalingClient {
    /// Connects to a relay server.
    ///
    /// No handshake is exchanged; the connection is usable immediately
    /// and rooms are entered explicitly via [`SignalingClient::join_room`].
    ///
    /// # Errors
    ///
    /// - [`SignalingError::Timeout`] if the connection attempt times out.
    /// - [`SignalingError::Connect`] if the relay cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, SignalingError> {
        let (ws_stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| {
                tracing::warn!(url = url, "relay WebSocket connect timed out");
                SignalingError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url = url, err = %e, "relay WebSocket connect failed");
                SignalingError::Connect(e.to_string())
            })?;

        let (ws_sender, ws_reader) = ws_stream.split();

        let (tx, rx) = mpsc::channel(256);
        let connected = Arc::new(AtomicBool::new(true));
        let reader_connected = Arc::clone(&connected);
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, reader_connected));

        Ok(Self {
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            events: rx,
            connected,
            _reader_handle: reader_handle,
        })
    }

    /// Joins a room, announcing `participant` to its current members.
    ///
    /// May be called more than once; a connection can belong to several
    /// rooms at the same time.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::ConnectionClosed`] if the relay
    /// connection is down.
    pub async fn join_room(&self, room: &str, participant: &str) -> Result<(), SignalingError> {
        self.send_event(&ClientEvent::JoinRoom {
            room: room.to_string(),
            participant: participant.to_string(),
        })
        .await
    }

    /// Sends chat text to a room. The relay echoes it to the whole room,
    /// this connection included.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::ConnectionClosed`] if the relay
    /// connection is down.
    pub async fn send_chat(&self, room: &str, text: &str) -> Result<(), SignalingError> {
        self.send_event(&ClientEvent::SendMessage {
            room: room.to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Relays a session description offer to the other members of a room.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::ConnectionClosed`] if the relay
    /// connection is down.
    pub async fn send_offer(&self, room: &str, sdp: &Sdp) -> Result<(), SignalingError> {
        self.send_event(&ClientEvent::Offer {
            room: room.to_string(),
            sdp: sdp.as_str().to_string(),
        })
        .await
    }

    /// Relays a session description answer to the other members of a room.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::ConnectionClosed`] if the relay
    /// connection is down.
    pub async fn send_answer(&self, room: &str, sdp: &Sdp) -> Result<(), SignalingError> {
        self.send_event(&ClientEvent::Answer {
            room: room.to_string(),
            sdp: sdp.as_str().to_string(),
        })
        .await
    }

    /// Relays an ICE candidate to the other members of a room.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::ConnectionClosed`] if the relay
    /// connection is down.
    pub async fn send_candidate(
        &self,
        room: &str,
        candidate: &Candidate,
    ) -> Result<(), SignalingError> {
        self.send_event(&ClientEvent::IceCandidate {
            room: room.to_string(),
            candidate: candidate.as_str().to_string(),
        })
        .await
    }

    /// Waits for the next event from the relay.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::ConnectionClosed`] once the relay
    /// connection is gone and the event channel has drained.
    pub async fn next_event(&mut self) -> Result<ServerEvent, SignalingError> {
        self.events
            .recv()
            .await
            .ok_or(SignalingError::ConnectionClosed)
    }

    /// Whether the relay connection is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn send_event(&self, event: &ClientEvent) -> Result<(), SignalingError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(SignalingError::ConnectionClosed);
        }

        let bytes = signal::encode_client(event)?;
        let mut sender = self.ws_sender.lock().await;
        sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "signaling send failed");
                self.connected.store(false, Ordering::Relaxed);
                SignalingError::ConnectionClosed
            })?;

        Ok(())
    }
}

/// Background task that reads WebSocket frames and dispatches them.
///
/// Malformed frames are logged and skipped; the task does not disconnect
/// on bad data. Sets `connected` to `false` when the WebSocket closes or
/// errors out.
async fn reader_loop(
    mut ws_reader: WsReader,
    tx: mpsc::Sender<ServerEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match signal::decode_server(&data) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        // Receiver dropped, the client is gone.
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed relay frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("relay WebSocket closed by server");
                break;
            }
            Ok(_) => {
                // Ignore text, ping, pong frames.
            }
            Err(e) => {
                tracing::warn!(err = %e, "relay WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::info!("signaling reader task exiting");
}
