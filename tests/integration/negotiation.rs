//! End-to-end negotiation tests.
//!
//! Drives two full peer sessions against a real relay and checks that
//! the offer/answer exchange establishes a transport on both sides,
//! that chat keeps flowing alongside negotiation, and that candidates
//! arriving before the transport exists are buffered and applied.
//!
//! Verification command: `cargo test --test negotiation`

use futures_util::SinkExt;
use tokio_tungstenite::tungstenite;

use roomcast::media::StaticMedia;
use roomcast::session::{PeerSession, SessionActivity, SessionState};
use roomcast::signaling::SignalingClient;
use roomcast::transport::loopback::LoopbackFactory;
use roomcast::transport::{Candidate, PeerTransport};
use roomcast_proto::signal::{self, ClientEvent};
use roomcast_relay::relay::start_server;

// =============================================================================
// Helpers
// =============================================================================

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Starts a relay server on a random port and returns its ws:// URL.
async fn start_relay() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = start_server("127.0.0.1:0")
        .await
        .expect("failed to start test relay");
    (format!("ws://{addr}/ws"), handle)
}

/// Builds a connected session around a shared factory handle.
async fn connected_session(
    url: &str,
    factory: LoopbackFactory,
) -> PeerSession<LoopbackFactory, StaticMedia> {
    let signaling = SignalingClient::connect(url).await.unwrap();
    let mut session = PeerSession::new(signaling, factory, StaticMedia::audio_video());
    session.start_capture().await.unwrap();
    session
}

/// Connects a raw WebSocket peer, bypassing the session layer.
async fn raw_peer(url: &str) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

/// Sends a client event from a raw peer.
async fn raw_send(ws: &mut WsStream, event: &ClientEvent) {
    let bytes = signal::encode_client(event).unwrap();
    ws.send(tungstenite::Message::Binary(bytes.into()))
        .await
        .unwrap();
}

// =============================================================================
// Offer/answer exchange between two sessions
// =============================================================================

/// Two sessions joining the same room negotiate to an established
/// transport on both sides: the existing member offers, the newcomer's
/// side answers, and the answer completes the exchange.
#[tokio::test]
async fn two_sessions_establish() {
    let (url, _handle) = start_relay().await;
    let alice_factory = LoopbackFactory::new();
    let bob_factory = LoopbackFactory::new();

    let mut alice = connected_session(&url, alice_factory.clone()).await;
    alice.join("lobby", "alice").await.unwrap();

    let mut bob = connected_session(&url, bob_factory.clone()).await;
    bob.join("lobby", "bob").await.unwrap();

    // Alice learns of bob and offers.
    let activity = alice.drive().await.unwrap();
    assert_eq!(activity, SessionActivity::PeerJoined("bob".to_string()));
    assert_eq!(alice.state(), SessionState::Negotiating);

    // Bob answers the offer; his side has both descriptions.
    let activity = bob.drive().await.unwrap();
    assert_eq!(activity, SessionActivity::AnswerSent);
    assert_eq!(bob.state(), SessionState::ConnectedToPeer);

    // The answer completes alice's side.
    let activity = alice.drive().await.unwrap();
    assert_eq!(activity, SessionActivity::AnswerApplied);
    assert_eq!(alice.state(), SessionState::ConnectedToPeer);

    assert!(alice_factory.created()[0].is_established());
    assert!(bob_factory.created()[0].is_established());
}

/// Chat keeps flowing through the relay while negotiation is underway
/// and after the transport is established.
#[tokio::test]
async fn chat_flows_alongside_negotiation() {
    let (url, _handle) = start_relay().await;

    let mut alice = connected_session(&url, LoopbackFactory::new()).await;
    alice.join("lobby", "alice").await.unwrap();
    let mut bob = connected_session(&url, LoopbackFactory::new()).await;
    bob.join("lobby", "bob").await.unwrap();

    let _ = alice.drive().await.unwrap(); // PeerJoined(bob), offer sent
    let _ = bob.drive().await.unwrap(); // AnswerSent
    let _ = alice.drive().await.unwrap(); // AnswerApplied

    alice.send_chat("are we live?").await.unwrap();

    // Chat includes the sender, so both sessions see it.
    assert_eq!(
        alice.drive().await.unwrap(),
        SessionActivity::Chat("are we live?".to_string())
    );
    assert_eq!(
        bob.drive().await.unwrap(),
        SessionActivity::Chat("are we live?".to_string())
    );
}

/// Both sessions attach their captured tracks before offering or
/// answering, so each transport carries the local media.
#[tokio::test]
async fn media_attached_on_both_sides() {
    let (url, _handle) = start_relay().await;
    let alice_factory = LoopbackFactory::new();
    let bob_factory = LoopbackFactory::new();

    let mut alice = connected_session(&url, alice_factory.clone()).await;
    alice.join("lobby", "alice").await.unwrap();
    let mut bob = connected_session(&url, bob_factory.clone()).await;
    bob.join("lobby", "bob").await.unwrap();

    let _ = alice.drive().await.unwrap();
    let _ = bob.drive().await.unwrap();
    let _ = alice.drive().await.unwrap();

    assert_eq!(alice_factory.created()[0].media_track_count(), 2);
    assert_eq!(bob_factory.created()[0].media_track_count(), 2);
}

// =============================================================================
// Candidate buffering through a real relay
// =============================================================================

/// A candidate that reaches a session before any transport exists is
/// buffered and applied once the newcomer announcement creates one.
#[tokio::test]
async fn early_candidate_survives_until_transport_exists() {
    let (url, _handle) = start_relay().await;
    let factory = LoopbackFactory::new();

    let mut alice = connected_session(&url, factory.clone()).await;
    alice.join("lobby", "alice").await.unwrap();

    // The raw peer sends its candidate before joining, so alice sees
    // the candidate first and the newcomer announcement second.
    let mut bob = raw_peer(&url).await;
    raw_send(
        &mut bob,
        &ClientEvent::IceCandidate {
            room: "lobby".to_string(),
            candidate: "cand-before-join".to_string(),
        },
    )
    .await;
    raw_send(
        &mut bob,
        &ClientEvent::JoinRoom {
            room: "lobby".to_string(),
            participant: "bob".to_string(),
        },
    )
    .await;

    let activity = alice.drive().await.unwrap();
    assert_eq!(activity, SessionActivity::CandidateBuffered);
    assert_eq!(alice.pending_candidate_count(), 1);

    // The announcement creates the transport and flushes the buffer
    // before the offer goes out.
    let activity = alice.drive().await.unwrap();
    assert_eq!(activity, SessionActivity::PeerJoined("bob".to_string()));
    assert_eq!(alice.pending_candidate_count(), 0);
    assert_eq!(
        factory.created()[0].applied_candidates(),
        vec![Candidate::new("cand-before-join")]
    );
}

/// Candidates arriving after establishment apply directly, in order,
/// behind any that were buffered.
#[tokio::test]
async fn candidates_apply_in_arrival_order() {
    let (url, _handle) = start_relay().await;
    let factory = LoopbackFactory::new();

    let mut alice = connected_session(&url, factory.clone()).await;
    alice.join("lobby", "alice").await.unwrap();

    let mut bob = raw_peer(&url).await;
    raw_send(
        &mut bob,
        &ClientEvent::IceCandidate {
            room: "lobby".to_string(),
            candidate: "cand-1".to_string(),
        },
    )
    .await;
    raw_send(
        &mut bob,
        &ClientEvent::JoinRoom {
            room: "lobby".to_string(),
            participant: "bob".to_string(),
        },
    )
    .await;
    raw_send(
        &mut bob,
        &ClientEvent::IceCandidate {
            room: "lobby".to_string(),
            candidate: "cand-2".to_string(),
        },
    )
    .await;

    let _ = alice.drive().await.unwrap(); // CandidateBuffered
    let _ = alice.drive().await.unwrap(); // PeerJoined, flushes cand-1
    let activity = alice.drive().await.unwrap();
    assert_eq!(activity, SessionActivity::CandidateApplied);

    assert_eq!(
        factory.created()[0].applied_candidates(),
        vec![Candidate::new("cand-1"), Candidate::new("cand-2")]
    );
}

// =============================================================================
// Disconnects during negotiation
// =============================================================================

/// A mid-negotiation disconnect tears down the transport and returns
/// the session to its joined state, ready for the next peer.
#[tokio::test]
async fn peer_disconnect_mid_negotiation_resets_session() {
    let (url, _handle) = start_relay().await;
    let factory = LoopbackFactory::new();

    let mut alice = connected_session(&url, factory.clone()).await;
    alice.join("lobby", "alice").await.unwrap();

    let mut bob = raw_peer(&url).await;
    raw_send(
        &mut bob,
        &ClientEvent::JoinRoom {
            room: "lobby".to_string(),
            participant: "bob".to_string(),
        },
    )
    .await;

    let activity = alice.drive().await.unwrap();
    assert_eq!(activity, SessionActivity::PeerJoined("bob".to_string()));
    assert_eq!(alice.state(), SessionState::Negotiating);

    bob.close(None).await.unwrap();

    let activity = alice.drive().await.unwrap();
    assert_eq!(activity, SessionActivity::PeerLeft("bob".to_string()));
    assert_eq!(alice.state(), SessionState::JoinedRoom);
    assert!(factory.created()[0].is_closed());

    // A new peer can negotiate on a fresh transport.
    let mut carol = raw_peer(&url).await;
    raw_send(
        &mut carol,
        &ClientEvent::JoinRoom {
            room: "lobby".to_string(),
            participant: "carol".to_string(),
        },
    )
    .await;

    let activity = alice.drive().await.unwrap();
    assert_eq!(activity, SessionActivity::PeerJoined("carol".to_string()));
    assert_eq!(factory.created().len(), 2);
}
