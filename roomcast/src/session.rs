//! Peer session state machine.
//!
//! Turns relay events into a negotiated peer-to-peer transport. The
//! session owns the signaling connection, a lazily created transport,
//! and a buffer for candidates that arrive before the transport exists.
//! All negotiation steps run on the single task that calls
//! [`PeerSession::drive`], so steps on one transport never interleave.

use roomcast_proto::signal::ServerEvent;

use crate::media::{MediaAccessError, MediaSource, MediaTracks};
use crate::signaling::SignalingClient;
use crate::transport::{Candidate, PeerTransport, Sdp, TransportError, TransportFactory};

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The relay connection is gone.
    Disconnected,
    /// Connected to the relay, not in any room yet.
    ConnectedToRelay,
    /// Joined a room, no negotiation in flight.
    JoinedRoom,
    /// An offer or answer has been created or received.
    Negotiating,
    /// Both descriptions are in place; the direct path is usable.
    ConnectedToPeer,
}

/// Errors from negotiation steps.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// An answer or candidate step needed a transport that does not
    /// exist yet. Recoverable: the session keeps running.
    #[error("no active transport for this negotiation step")]
    NoTransport,

    /// The underlying transport failed. The caller may re-offer or
    /// surface the failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors from driving a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The signaling connection failed.
    #[error("signaling error: {0}")]
    Signaling(#[from] crate::signaling::SignalingError),

    /// A negotiation step failed.
    #[error("negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    /// An operation required a room before `join` was called.
    #[error("not joined to a room")]
    NotJoined,
}

/// What one processed relay event amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionActivity {
    /// A newcomer was announced; an offer was sent toward them.
    PeerJoined(String),
    /// An incoming offer was applied and answered.
    AnswerSent,
    /// An incoming answer was applied to the pending offer.
    AnswerApplied,
    /// A candidate was applied to the live transport.
    CandidateApplied,
    /// A candidate arrived before the transport existed and was buffered.
    CandidateBuffered,
    /// Chat text was received (possibly this session's own echo).
    Chat(String),
    /// The negotiated peer (or some other participant) went away.
    PeerLeft(String),
    /// The relay rejected one of this connection's frames.
    RelayRejected(String),
}

/// Event-driven peer session.
///
/// Built from a connected [`SignalingClient`], a [`TransportFactory`],
/// and a [`MediaSource`]. The owner repeatedly calls
/// [`drive`](PeerSession::drive) to pump relay events through the state
/// machine.
pub struct PeerSession<F: TransportFactory, M: MediaSource> {
    signaling: SignalingClient,
    factory: F,
    media: M,
    room: Option<String>,
    participant: Option<String>,
    tracks: Option<MediaTracks>,
    transport: Option<F::Transport>,
    pending_candidates: Vec<Candidate>,
    remote_peer: Option<String>,
    state: SessionState,
}

impl<F: TransportFactory, M: MediaSource> PeerSession<F, M> {
    /// Wraps a connected signaling client into a fresh session.
    pub fn new(signaling: SignalingClient, factory: F, media: M) -> Self {
        Self {
            signaling,
            factory,
            media,
            room: None,
            participant: None,
            tracks: None,
            transport: None,
            pending_candidates: Vec::new(),
            remote_peer: None,
            state: SessionState::ConnectedToRelay,
        }
    }

    /// Acquires local media tracks for later attachment.
    ///
    /// # Errors
    ///
    /// Returns [`MediaAccessError`] if capture fails. The signaling
    /// connection is untouched either way; a session without media can
    /// still join, chat, and negotiate a receive-only transport.
    pub async fn start_capture(&mut self) -> Result<(), MediaAccessError> {
        self.tracks = Some(self.media.acquire().await?);
        Ok(())
    }

    /// Joins a room under the given participant token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Signaling`] if the relay connection is
    /// down.
    pub async fn join(&mut self, room: &str, participant: &str) -> Result<(), SessionError> {
        self.signaling.join_room(room, participant).await?;
        self.room = Some(room.to_string());
        self.participant = Some(participant.to_string());
        self.state = SessionState::JoinedRoom;
        Ok(())
    }

    /// Sends chat text to the joined room.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotJoined`] before `join`, or
    /// [`SessionError::Signaling`] if the relay connection is down.
    pub async fn send_chat(&self, text: &str) -> Result<(), SessionError> {
        let room = self.room.as_deref().ok_or(SessionError::NotJoined)?;
        self.signaling.send_chat(room, text).await?;
        Ok(())
    }

    /// Relays a locally gathered ICE candidate to the joined room.
    ///
    /// Hosts running a real trickle-ICE transport call this for each
    /// candidate their transport produces; the other members apply or
    /// buffer it on their side.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotJoined`] before `join`, or
    /// [`SessionError::Signaling`] if the relay connection is down.
    pub async fn send_candidate(&self, candidate: &Candidate) -> Result<(), SessionError> {
        let room = self.room.as_deref().ok_or(SessionError::NotJoined)?;
        self.signaling.send_candidate(room, candidate).await?;
        Ok(())
    }

    /// Waits for the next relay event and runs it through the state
    /// machine.
    ///
    /// # Errors
    ///
    /// Signaling loss moves the session to
    /// [`SessionState::Disconnected`] and surfaces as
    /// [`SessionError::Signaling`]. Negotiation errors are recoverable;
    /// the session stays usable and the caller decides whether to
    /// re-offer.
    pub async fn drive(&mut self) -> Result<SessionActivity, SessionError> {
        let event = match self.signaling.next_event().await {
            Ok(event) => event,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e.into());
            }
        };
        self.process(event).await
    }

    /// Runs one relay event through the state machine.
    ///
    /// Exposed so callers that multiplex their own event sources can
    /// feed events directly; [`drive`](PeerSession::drive) is this plus
    /// the blocking read.
    ///
    /// # Errors
    ///
    /// See [`drive`](PeerSession::drive).
    pub async fn process(&mut self, event: ServerEvent) -> Result<SessionActivity, SessionError> {
        match event {
            ServerEvent::UserConnected { participant } => {
                let room = self.require_room()?;
                self.remote_peer = Some(participant.clone());
                self.ensure_transport().await?;
                let Some(transport) = &self.transport else {
                    return Err(NegotiationError::NoTransport.into());
                };
                let offer = transport
                    .create_offer()
                    .await
                    .map_err(NegotiationError::Transport)?;
                flush_pending(&mut self.pending_candidates, transport).await?;
                self.signaling.send_offer(&room, &offer).await?;
                self.state = SessionState::Negotiating;
                Ok(SessionActivity::PeerJoined(participant))
            }

            ServerEvent::Offer { sdp } => {
                let room = self.require_room()?;
                self.ensure_transport().await?;
                let answer = {
                    let Some(transport) = &self.transport else {
                        return Err(NegotiationError::NoTransport.into());
                    };
                    let answer = transport
                        .accept_offer(&Sdp::new(sdp))
                        .await
                        .map_err(NegotiationError::Transport)?;
                    flush_pending(&mut self.pending_candidates, transport).await?;
                    answer
                };
                self.signaling.send_answer(&room, &answer).await?;
                self.state = SessionState::Negotiating;
                self.refresh_established();
                Ok(SessionActivity::AnswerSent)
            }

            ServerEvent::Answer { sdp } => {
                // Ordering guard: an answer can only apply to an offer
                // this session already created.
                let Some(transport) = &self.transport else {
                    tracing::warn!("answer arrived before any offer was made, dropping");
                    return Err(NegotiationError::NoTransport.into());
                };
                transport
                    .accept_answer(&Sdp::new(sdp))
                    .await
                    .map_err(NegotiationError::Transport)?;
                flush_pending(&mut self.pending_candidates, transport).await?;
                self.refresh_established();
                Ok(SessionActivity::AnswerApplied)
            }

            ServerEvent::IceCandidate { candidate } => {
                let candidate = Candidate::new(candidate);
                if let Some(transport) = &self.transport {
                    transport
                        .add_candidate(&candidate)
                        .await
                        .map_err(NegotiationError::Transport)?;
                    self.refresh_established();
                    Ok(SessionActivity::CandidateApplied)
                } else {
                    tracing::debug!("buffering candidate that arrived before the transport");
                    self.pending_candidates.push(candidate);
                    Ok(SessionActivity::CandidateBuffered)
                }
            }

            ServerEvent::UserDisconnected { participant } => {
                // The answering side never receives UserConnected for
                // the peer whose offer it answered, so remote_peer can
                // be unset while a transport is live. A live transport
                // with no recorded peer belongs to the departed one.
                let negotiated = self.remote_peer.as_deref() == Some(participant.as_str())
                    || (self.remote_peer.is_none() && self.transport.is_some());
                if negotiated {
                    if let Some(transport) = self.transport.take() {
                        transport.close().await;
                    }
                    self.pending_candidates.clear();
                    self.remote_peer = None;
                    if self.room.is_some() {
                        self.state = SessionState::JoinedRoom;
                    }
                }
                Ok(SessionActivity::PeerLeft(participant))
            }

            ServerEvent::ReceiveMessage { text } => Ok(SessionActivity::Chat(text)),

            ServerEvent::Error { reason } => {
                tracing::warn!(reason = %reason, "relay rejected a frame");
                Ok(SessionActivity::RelayRejected(reason))
            }
        }
    }

    /// Current state of the session.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Candidates waiting for a transport to apply them to.
    #[must_use]
    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.len()
    }

    /// The joined room, if any.
    #[must_use]
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    fn require_room(&self) -> Result<String, SessionError> {
        self.room.clone().ok_or(SessionError::NotJoined)
    }

    async fn ensure_transport(&mut self) -> Result<(), SessionError> {
        if self.transport.is_some() {
            return Ok(());
        }
        let transport = self
            .factory
            .create()
            .await
            .map_err(NegotiationError::Transport)?;
        if let Some(tracks) = &self.tracks {
            transport
                .attach_media(tracks)
                .await
                .map_err(NegotiationError::Transport)?;
        }
        self.transport = Some(transport);
        Ok(())
    }

    fn refresh_established(&mut self) {
        if let Some(transport) = &self.transport
            && transport.is_established()
        {
            self.state = SessionState::ConnectedToPeer;
        }
    }
}

/// Applies buffered candidates to a transport in arrival order.
async fn flush_pending<T: PeerTransport>(
    pending: &mut Vec<Candidate>,
    transport: &T,
) -> Result<(), NegotiationError> {
    for candidate in pending.drain(..) {
        transport.add_candidate(&candidate).await?;
    }
    Ok(())
}
