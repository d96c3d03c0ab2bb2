//! Signaling wire protocol for the roomcast relay.
//!
//! Two postcard-encoded enums travel as WebSocket binary frames:
//! [`ClientEvent`] from peer to relay and [`ServerEvent`] from relay to
//! peer. Session descriptions and ICE candidates are opaque strings: the
//! relay routes them by room without ever parsing their contents, so any
//! signaling schema the peers agree on works unchanged.

use serde::{Deserialize, Serialize};

/// Events a peer sends to the relay.
///
/// Every variant carries the room it is scoped to. The relay does not
/// check that the sender previously joined that room before fanning the
/// event out to the room's members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Subscribe this connection to a room, announcing `participant`
    /// (an opaque client-chosen token, neither validated nor
    /// deduplicated) to the members already present.
    JoinRoom {
        /// Room identifier. Created implicitly on first join.
        room: String,
        /// Token announced to other members in presence events.
        participant: String,
    },

    /// Chat text relayed to the whole room, sender included.
    SendMessage {
        /// Target room.
        room: String,
        /// Opaque chat payload.
        text: String,
    },

    /// Session description offer, relayed to every other member.
    Offer {
        /// Target room.
        room: String,
        /// Opaque session description.
        sdp: String,
    },

    /// Session description answer, relayed to every other member.
    Answer {
        /// Target room.
        room: String,
        /// Opaque session description.
        sdp: String,
    },

    /// ICE candidate, relayed to every other member.
    IceCandidate {
        /// Target room.
        room: String,
        /// Opaque candidate descriptor.
        candidate: String,
    },
}

/// Events the relay sends to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// A new participant joined a room this connection is in.
    UserConnected {
        /// The newcomer's participant token.
        participant: String,
    },

    /// A participant's connection went away.
    UserDisconnected {
        /// The departed participant's token, as recorded at join time.
        participant: String,
    },

    /// Chat text relayed from a room member (possibly this connection).
    ReceiveMessage {
        /// Opaque chat payload.
        text: String,
    },

    /// Session description offer from another room member.
    Offer {
        /// Opaque session description.
        sdp: String,
    },

    /// Session description answer from another room member.
    Answer {
        /// Opaque session description.
        sdp: String,
    },

    /// ICE candidate from another room member.
    IceCandidate {
        /// Opaque candidate descriptor.
        candidate: String,
    },

    /// The relay rejected a frame from this connection.
    ///
    /// Sent only to the offending connection; nothing is fanned out.
    Error {
        /// Human-readable rejection reason.
        reason: String,
    },
}

/// Error type for wire encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes a [`ClientEvent`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the event cannot be encoded.
pub fn encode_client(event: &ClientEvent) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ClientEvent`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes are not a valid event.
pub fn decode_client(bytes: &[u8]) -> Result<ClientEvent, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`ServerEvent`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the event cannot be encoded.
pub fn encode_server(event: &ServerEvent) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ServerEvent`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes are not a valid event.
pub fn decode_server(bytes: &[u8]) -> Result<ServerEvent, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
