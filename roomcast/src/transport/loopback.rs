//! Loopback transport for testing.
//!
//! Records the negotiation steps the session performs without moving any
//! media. Descriptions are synthetic strings, candidates accumulate in a
//! list, and the transport counts as established once both a local and a
//! remote description are in place. [`LoopbackFactory`] keeps a handle to
//! every transport it creates so tests can inspect them afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::media::MediaTracks;
use crate::transport::{Candidate, PeerTransport, Sdp, TransportError, TransportFactory};

#[derive(Debug, Default)]
struct State {
    local_desc: Option<Sdp>,
    remote_desc: Option<Sdp>,
    candidates: Vec<Candidate>,
    media_tracks: usize,
    closed: bool,
}

/// In-process transport that records negotiation state.
///
/// Cloning yields another handle to the same underlying state.
#[derive(Clone)]
pub struct LoopbackTransport {
    tag: String,
    state: Arc<Mutex<State>>,
}

impl LoopbackTransport {
    /// Creates a fresh transport whose synthetic descriptions carry `tag`.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Candidates applied so far, in arrival order.
    #[must_use]
    pub fn applied_candidates(&self) -> Vec<Candidate> {
        self.state.lock().candidates.clone()
    }

    /// Number of media tracks attached.
    #[must_use]
    pub fn media_track_count(&self) -> usize {
        self.state.lock().media_tracks
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl PeerTransport for LoopbackTransport {
    async fn attach_media(&self, tracks: &MediaTracks) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.media_tracks = tracks.track_count();
        Ok(())
    }

    async fn create_offer(&self) -> Result<Sdp, TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let offer = Sdp::new(format!("offer:{}", self.tag));
        state.local_desc = Some(offer.clone());
        Ok(offer)
    }

    async fn accept_offer(&self, remote: &Sdp) -> Result<Sdp, TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.remote_desc = Some(remote.clone());
        let answer = Sdp::new(format!("answer:{}", self.tag));
        state.local_desc = Some(answer.clone());
        Ok(answer)
    }

    async fn accept_answer(&self, remote: &Sdp) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.local_desc.is_none() {
            return Err(TransportError::Failed(
                "answer received with no local offer".to_string(),
            ));
        }
        state.remote_desc = Some(remote.clone());
        Ok(())
    }

    async fn add_candidate(&self, candidate: &Candidate) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.candidates.push(candidate.clone());
        Ok(())
    }

    fn is_established(&self) -> bool {
        let state = self.state.lock();
        !state.closed && state.local_desc.is_some() && state.remote_desc.is_some()
    }

    async fn close(&self) {
        self.state.lock().closed = true;
    }
}

/// Factory producing [`LoopbackTransport`]s.
///
/// Clones share the creation log, so a test can hand one clone to the
/// session and keep another for inspection. `set_fail` makes subsequent
/// `create` calls fail, for exercising transport error paths.
#[derive(Clone, Default)]
pub struct LoopbackFactory {
    created: Arc<Mutex<Vec<LoopbackTransport>>>,
    fail: Arc<AtomicBool>,
}

impl LoopbackFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles to every transport created so far, in creation order.
    #[must_use]
    pub fn created(&self) -> Vec<LoopbackTransport> {
        self.created.lock().clone()
    }

    /// Makes future `create` calls fail when `fail` is true.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

impl TransportFactory for LoopbackFactory {
    type Transport = LoopbackTransport;

    async fn create(&self) -> Result<LoopbackTransport, TransportError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(TransportError::Failed(
                "transport creation refused".to_string(),
            ));
        }
        let mut created = self.created.lock();
        let transport = LoopbackTransport::new(format!("loopback-{}", created.len()));
        created.push(transport.clone());
        Ok(transport)
    }
}
