//! Integration tests for presence announcements.
//!
//! Tests the join asymmetry (only existing members learn of a newcomer),
//! the participant token recorded at join time, and disconnect
//! announcements across every room a connection had joined.
//!
//! Verification command: `cargo test --test presence`

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use roomcast_proto::signal::{self, ClientEvent, ServerEvent};
use roomcast_relay::relay::start_server;

// =============================================================================
// Type aliases and helpers
// =============================================================================

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Starts a relay server on a random port for testing.
async fn start_relay() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test relay")
}

/// Connects a WebSocket client to the relay.
async fn connect(addr: std::net::SocketAddr) -> WsStream {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

/// Sends a client event through the relay.
async fn send_event(ws: &mut WsStream, event: &ClientEvent) {
    let bytes = signal::encode_client(event).unwrap();
    ws.send(tungstenite::Message::Binary(bytes.into()))
        .await
        .unwrap();
}

/// Receives and decodes a server event from a WebSocket.
async fn recv_event(ws: &mut WsStream) -> ServerEvent {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("recv timed out")
        .unwrap()
        .unwrap();
    signal::decode_server(&msg.into_data()).unwrap()
}

/// Joins a room under a participant token.
async fn join(ws: &mut WsStream, room: &str, participant: &str) {
    send_event(
        ws,
        &ClientEvent::JoinRoom {
            room: room.to_string(),
            participant: participant.to_string(),
        },
    )
    .await;
}

// =============================================================================
// Join asymmetry
// =============================================================================

/// Existing members learn of a newcomer; the newcomer receives no
/// retroactive announcements about who was already there.
#[tokio::test]
async fn newcomer_gets_no_retroactive_presence() {
    let (addr, _handle) = start_relay().await;

    let mut alice = connect(addr).await;
    join(&mut alice, "lobby", "alice").await;

    let mut bob = connect(addr).await;
    join(&mut bob, "lobby", "bob").await;

    assert_eq!(
        recv_event(&mut alice).await,
        ServerEvent::UserConnected {
            participant: "bob".to_string()
        }
    );

    // Bob's first inbound event is the chat alice sends after his join,
    // not a UserConnected for alice.
    send_event(
        &mut alice,
        &ClientEvent::SendMessage {
            room: "lobby".to_string(),
            text: "welcome".to_string(),
        },
    )
    .await;
    assert_eq!(
        recv_event(&mut bob).await,
        ServerEvent::ReceiveMessage {
            text: "welcome".to_string()
        }
    );
}

/// Each newcomer is announced to everyone already present, so a third
/// member produces two announcements.
#[tokio::test]
async fn every_existing_member_sees_the_newcomer() {
    let (addr, _handle) = start_relay().await;

    let mut alice = connect(addr).await;
    join(&mut alice, "lobby", "alice").await;
    let mut bob = connect(addr).await;
    join(&mut bob, "lobby", "bob").await;
    let _ = recv_event(&mut alice).await; // UserConnected(bob)

    let mut carol = connect(addr).await;
    join(&mut carol, "lobby", "carol").await;

    let expected = ServerEvent::UserConnected {
        participant: "carol".to_string(),
    };
    assert_eq!(recv_event(&mut alice).await, expected);
    assert_eq!(recv_event(&mut bob).await, expected);
}

/// Rejoining a room replaces the recorded participant token; the later
/// token is the one used in the disconnect announcement.
#[tokio::test]
async fn rejoin_updates_announced_token() {
    let (addr, _handle) = start_relay().await;

    let mut alice = connect(addr).await;
    join(&mut alice, "lobby", "alice").await;

    let mut bob = connect(addr).await;
    join(&mut bob, "lobby", "bob").await;
    assert_eq!(
        recv_event(&mut alice).await,
        ServerEvent::UserConnected {
            participant: "bob".to_string()
        }
    );

    // Same connection joins again under a new token.
    join(&mut bob, "lobby", "bobby").await;
    assert_eq!(
        recv_event(&mut alice).await,
        ServerEvent::UserConnected {
            participant: "bobby".to_string()
        }
    );

    bob.close(None).await.unwrap();
    assert_eq!(
        recv_event(&mut alice).await,
        ServerEvent::UserDisconnected {
            participant: "bobby".to_string()
        }
    );
}

// =============================================================================
// Disconnect announcements
// =============================================================================

/// A disconnect is announced in every room the connection had joined,
/// each with the token recorded for that room.
#[tokio::test]
async fn disconnect_announced_in_all_joined_rooms() {
    let (addr, _handle) = start_relay().await;

    let mut watcher_1 = connect(addr).await;
    join(&mut watcher_1, "room-1", "watcher-1").await;
    let mut watcher_2 = connect(addr).await;
    join(&mut watcher_2, "room-2", "watcher-2").await;

    // Bob joins both rooms under different tokens.
    let mut bob = connect(addr).await;
    join(&mut bob, "room-1", "bob-in-1").await;
    join(&mut bob, "room-2", "bob-in-2").await;
    let _ = recv_event(&mut watcher_1).await; // UserConnected(bob-in-1)
    let _ = recv_event(&mut watcher_2).await; // UserConnected(bob-in-2)

    bob.close(None).await.unwrap();

    assert_eq!(
        recv_event(&mut watcher_1).await,
        ServerEvent::UserDisconnected {
            participant: "bob-in-1".to_string()
        }
    );
    assert_eq!(
        recv_event(&mut watcher_2).await,
        ServerEvent::UserDisconnected {
            participant: "bob-in-2".to_string()
        }
    );
}

/// A disconnect is not announced in rooms the connection never joined.
#[tokio::test]
async fn disconnect_silent_in_unrelated_rooms() {
    let (addr, _handle) = start_relay().await;

    let mut watcher = connect(addr).await;
    join(&mut watcher, "quiet-room", "watcher").await;

    let mut bob = connect(addr).await;
    join(&mut bob, "busy-room", "bob").await;
    bob.close(None).await.unwrap();

    // The watcher's next event is its own chat, not a disconnect.
    send_event(
        &mut watcher,
        &ClientEvent::SendMessage {
            room: "quiet-room".to_string(),
            text: "nothing happened".to_string(),
        },
    )
    .await;
    assert_eq!(
        recv_event(&mut watcher).await,
        ServerEvent::ReceiveMessage {
            text: "nothing happened".to_string()
        }
    );
}

/// After the last member leaves, the room is gone; a fresh join starts
/// it over with no residual members to announce to.
#[tokio::test]
async fn emptied_room_restarts_clean() {
    let (addr, _handle) = start_relay().await;

    let mut alice = connect(addr).await;
    join(&mut alice, "ephemeral", "alice").await;
    alice.close(None).await.unwrap();

    // Give the relay a moment to process the departure.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut bob = connect(addr).await;
    join(&mut bob, "ephemeral", "bob").await;

    // Bob is alone: his chat comes straight back with nothing before it.
    send_event(
        &mut bob,
        &ClientEvent::SendMessage {
            room: "ephemeral".to_string(),
            text: "fresh start".to_string(),
        },
    )
    .await;
    assert_eq!(
        recv_event(&mut bob).await,
        ServerEvent::ReceiveMessage {
            text: "fresh start".to_string()
        }
    );
}
