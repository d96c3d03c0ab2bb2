//! Peer transport abstraction.
//!
//! Defines the [`PeerTransport`] trait the negotiation state machine
//! drives. The concrete WebRTC implementation is supplied by the host
//! application; [`loopback::LoopbackTransport`] implements the trait
//! in-process for tests. The session never sees transport internals,
//! only session descriptions and candidates as opaque values.

pub mod loopback;

use std::fmt;
use std::future::Future;

use crate::media::MediaTracks;

/// Opaque session description (an SDP offer or answer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sdp(String);

impl Sdp {
    /// Wraps a raw session description.
    pub fn new(sdp: impl Into<String>) -> Self {
        Self(sdp.into())
    }

    /// Raw session description text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sdp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque ICE candidate descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate(String);

impl Candidate {
    /// Wraps a raw candidate descriptor.
    pub fn new(candidate: impl Into<String>) -> Self {
        Self(candidate.into())
    }

    /// Raw candidate text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from the underlying peer transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport has been closed.
    #[error("transport closed")]
    Closed,

    /// A negotiation step or the network path failed.
    #[error("transport failure: {0}")]
    Failed(String),
}

/// One direct connection toward a remote peer.
///
/// Implementations are driven by exactly one task at a time; the session
/// serializes negotiation steps, so methods never race each other.
pub trait PeerTransport: Send + Sync {
    /// Attaches local media tracks to be offered to the remote peer.
    fn attach_media(
        &self,
        tracks: &MediaTracks,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Produces a local offer and records it as the local description.
    fn create_offer(&self) -> impl Future<Output = Result<Sdp, TransportError>> + Send;

    /// Applies a remote offer and produces the local answer.
    fn accept_offer(&self, remote: &Sdp)
    -> impl Future<Output = Result<Sdp, TransportError>> + Send;

    /// Applies a remote answer to a previously created offer.
    fn accept_answer(&self, remote: &Sdp)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Adds a remote ICE candidate.
    fn add_candidate(
        &self,
        candidate: &Candidate,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Whether both descriptions are in place and the path is usable.
    fn is_established(&self) -> bool;

    /// Tears the transport down. Idempotent.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Builds transports on demand.
///
/// The session creates a transport lazily: either when it learns of a
/// newcomer to offer to, or when the first remote offer arrives.
pub trait TransportFactory: Send + Sync {
    /// Transport type this factory produces.
    type Transport: PeerTransport;

    /// Creates a fresh, unnegotiated transport.
    fn create(&self) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}
