//! Relay server core: shared state, WebSocket handler, and room fan-out.
//!
//! The relay accepts WebSocket connections, assigns each a [`ConnId`],
//! and routes signaling events between members of named rooms. Payloads
//! are never inspected or persisted: delivery is at-most-once,
//! fire-and-forget, with no acknowledgments and no retries. The only
//! state held is the connection registry and the room table, both of
//! which empty out as connections close.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use roomcast_proto::signal::{self, ClientEvent, ServerEvent};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::rooms::{ConnId, RoomTable};

/// Default maximum allowed frame size in bytes (64 KiB).
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Shared relay state holding the connection registry and room table.
pub struct RelayState {
    /// Maps `ConnId` to a channel sender feeding that connection's
    /// WebSocket writer task.
    connections: RwLock<HashMap<ConnId, mpsc::UnboundedSender<Message>>>,
    /// Room membership, forward and reverse indexed.
    pub rooms: RoomTable,
    /// Maximum allowed inbound frame size in bytes.
    max_payload_size: usize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates relay state with the default frame size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Creates relay state with a custom frame size limit.
    #[must_use]
    pub fn with_config(max_payload_size: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            rooms: RoomTable::new(),
            max_payload_size,
        }
    }

    /// Registers a connection's writer channel.
    pub async fn register(&self, conn: ConnId, sender: mpsc::UnboundedSender<Message>) {
        let mut conns = self.connections.write().await;
        conns.insert(conn, sender);
    }

    /// Removes a connection from the registry.
    pub async fn unregister(&self, conn: ConnId) {
        let mut conns = self.connections.write().await;
        conns.remove(&conn);
    }

    /// Returns a clone of the writer channel for a connection, if present.
    pub async fn get_sender(&self, conn: ConnId) -> Option<mpsc::UnboundedSender<Message>> {
        let conns = self.connections.read().await;
        conns.get(&conn).cloned()
    }

    /// Number of currently registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

/// Handles an upgraded WebSocket connection for its whole lifetime.
///
/// The connection lifecycle:
/// 1. Assign a fresh [`ConnId`] and register a writer channel.
/// 2. Spawn a writer task draining the channel into the socket.
/// 3. Read frames, dispatching each [`ClientEvent`] to room fan-out.
/// 4. On disconnect, remove the connection from every room it joined and
///    announce `UserDisconnected` to the members left behind.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let conn = Uuid::now_v7();
    tracing::info!(conn = %conn, "connection established");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(conn, tx).await;

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn = %conn, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_frame(conn, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(conn = %conn, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.unregister(conn).await;

    // Announce the departure in every room this connection had joined,
    // using the participant token recorded at join time for each.
    let departures = state.rooms.remove_connection(conn).await;
    for departure in departures {
        tracing::info!(
            conn = %conn,
            room = %departure.room,
            participant = %departure.participant,
            "announcing disconnect"
        );
        fan_out(
            &state,
            &departure.remaining,
            &ServerEvent::UserDisconnected {
                participant: departure.participant,
            },
        )
        .await;
    }

    tracing::info!(conn = %conn, "connection closed");
}

/// Dispatches one binary frame from a connection.
async fn handle_frame(conn: ConnId, data: &[u8], state: &Arc<RelayState>) {
    if data.len() > state.max_payload_size {
        tracing::warn!(
            conn = %conn,
            size = data.len(),
            max = state.max_payload_size,
            "frame exceeds size limit"
        );
        reject(
            state,
            conn,
            &format!(
                "payload too large: {} bytes (max {})",
                data.len(),
                state.max_payload_size
            ),
        )
        .await;
        return;
    }

    let event = match signal::decode_client(data) {
        Ok(event) => event,
        Err(e) => {
            // Malformed frame: log and drop, keep the connection open.
            tracing::warn!(conn = %conn, error = %e, "failed to decode frame");
            return;
        }
    };

    let room = match &event {
        ClientEvent::JoinRoom { room, .. }
        | ClientEvent::SendMessage { room, .. }
        | ClientEvent::Offer { room, .. }
        | ClientEvent::Answer { room, .. }
        | ClientEvent::IceCandidate { room, .. } => room,
    };
    if room.is_empty() {
        reject(state, conn, "empty room id").await;
        return;
    }

    match event {
        ClientEvent::JoinRoom { room, participant } => {
            let others = state.rooms.join(&room, conn, &participant).await;
            tracing::info!(
                conn = %conn,
                room = %room,
                participant = %participant,
                notified = others.len(),
                "joined room"
            );
            // Only the members already present learn of the newcomer; the
            // newcomer is not told about them. Existing members react by
            // initiating offers, which is how the newcomer discovers them.
            fan_out(state, &others, &ServerEvent::UserConnected { participant }).await;
        }
        ClientEvent::SendMessage { room, text } => {
            // Chat goes to the whole room, sender included. This is the
            // documented asymmetry with the signaling events below.
            let members = state.rooms.members(&room).await;
            fan_out(state, &members, &ServerEvent::ReceiveMessage { text }).await;
        }
        ClientEvent::Offer { room, sdp } => {
            let others = state.rooms.others(&room, conn).await;
            fan_out(state, &others, &ServerEvent::Offer { sdp }).await;
        }
        ClientEvent::Answer { room, sdp } => {
            let others = state.rooms.others(&room, conn).await;
            fan_out(state, &others, &ServerEvent::Answer { sdp }).await;
        }
        ClientEvent::IceCandidate { room, candidate } => {
            let others = state.rooms.others(&room, conn).await;
            fan_out(state, &others, &ServerEvent::IceCandidate { candidate }).await;
        }
    }
}

/// Encodes a server event once and pushes it to every listed connection.
///
/// Connections whose writer channel is gone are skipped; delivery is
/// best-effort and failures are not reported to the sender.
async fn fan_out(state: &Arc<RelayState>, targets: &[ConnId], event: &ServerEvent) {
    let bytes = match signal::encode_server(event) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode server event");
            return;
        }
    };
    for target in targets {
        if let Some(sender) = state.get_sender(*target).await {
            let _ = sender.send(Message::Binary(bytes.clone().into()));
        }
    }
}

/// Reports a protocol violation back to the offending connection only.
async fn reject(state: &Arc<RelayState>, conn: ConnId, reason: &str) {
    let event = ServerEvent::Error {
        reason: reason.to_string(),
    };
    if let Some(sender) = state.get_sender(conn).await
        && let Ok(bytes) = signal::encode_server(&event)
    {
        let _ = sender.send(Message::Binary(bytes.into()));
    }
}

/// Starts the relay server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// Use [`RelayState::with_config`] to apply limits from the resolved
/// [`crate::config::RelayConfig`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
