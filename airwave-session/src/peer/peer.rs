use crate::transport::ConnectionWrapper;
use airwave_core::{IceCandidatePayload, PeerId};
use anyhow::Result;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Which half of the offer/answer exchange this side plays for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerSide {
    /// Broadcaster: creates the offer.
    Offerer,
    /// Listener: answers the offer.
    Answerer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    New,
    OfferSent,
    AnswerReceived,
    OfferReceived,
    AnswerSent,
    Connected,
    Failed,
}

impl HandshakeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HandshakeState::Connected | HandshakeState::Failed)
    }

    fn can_advance(self, side: PeerSide, next: HandshakeState) -> bool {
        use HandshakeState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        match side {
            PeerSide::Offerer => matches!(
                (self, next),
                (New, OfferSent) | (OfferSent, AnswerReceived) | (AnswerReceived, Connected)
            ),
            PeerSide::Answerer => matches!(
                (self, next),
                (New, OfferReceived) | (OfferReceived, AnswerSent) | (AnswerSent, Connected)
            ),
        }
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandshakeState::New => "new",
            HandshakeState::OfferSent => "offer-sent",
            HandshakeState::AnswerReceived => "answer-received",
            HandshakeState::OfferReceived => "offer-received",
            HandshakeState::AnswerSent => "answer-sent",
            HandshakeState::Connected => "connected",
            HandshakeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of handing a remote candidate to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    Applied,
    /// Remote description not set yet; applied once it is.
    Queued,
}

/// One remote participant's connection and handshake progress.
pub struct Peer {
    connection: ConnectionWrapper,
    side: PeerSide,
    handshake: Mutex<HandshakeState>,
    link: Mutex<RTCPeerConnectionState>,
    remote_description_set: AtomicBool,
    pending_candidates: Mutex<Vec<IceCandidatePayload>>,
}

impl Peer {
    pub fn new(connection: ConnectionWrapper, side: PeerSide) -> Self {
        Self {
            connection,
            side,
            handshake: Mutex::new(HandshakeState::New),
            link: Mutex::new(RTCPeerConnectionState::New),
            remote_description_set: AtomicBool::new(false),
            pending_candidates: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.connection.peer_id
    }

    pub fn epoch(&self) -> u64 {
        self.connection.epoch
    }

    pub fn connection(&self) -> &ConnectionWrapper {
        &self.connection
    }

    pub fn handshake(&self) -> HandshakeState {
        *self.handshake.lock()
    }

    pub fn link_state(&self) -> RTCPeerConnectionState {
        *self.link.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.link_state() == RTCPeerConnectionState::Connected
    }

    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.lock().len()
    }

    /// Moves the handshake forward. Returns false, leaving the state
    /// untouched, when the transition is not valid for this side.
    pub fn advance(&self, next: HandshakeState) -> bool {
        let mut state = self.handshake.lock();
        let current = *state;
        if !current.can_advance(self.side, next) {
            debug!(peer = %self.id(), from = %current, to = %next, "Handshake transition refused");
            return false;
        }
        *state = next;
        true
    }

    pub fn fail(&self) -> bool {
        self.advance(HandshakeState::Failed)
    }

    pub(crate) fn set_link_state(&self, state: RTCPeerConnectionState) {
        *self.link.lock() = state;
    }

    pub async fn apply_remote_offer(&self, sdp: String) -> Result<usize> {
        self.connection.set_remote_offer(sdp).await?;
        Ok(self.flush_pending().await)
    }

    pub async fn apply_remote_answer(&self, sdp: String) -> Result<usize> {
        self.connection.set_remote_answer(sdp).await?;
        Ok(self.flush_pending().await)
    }

    pub async fn add_remote_candidate(
        &self,
        candidate: IceCandidatePayload,
    ) -> Result<CandidateDisposition> {
        {
            let mut pending = self.pending_candidates.lock();
            if !self.remote_description_set.load(Ordering::SeqCst) {
                pending.push(candidate);
                return Ok(CandidateDisposition::Queued);
            }
        }
        self.connection.add_ice_candidate(candidate).await?;
        Ok(CandidateDisposition::Applied)
    }

    async fn flush_pending(&self) -> usize {
        let queued = {
            let mut pending = self.pending_candidates.lock();
            self.remote_description_set.store(true, Ordering::SeqCst);
            std::mem::take(&mut *pending)
        };

        let count = queued.len();
        for candidate in queued {
            if let Err(e) = self.connection.add_ice_candidate(candidate).await {
                warn!(peer = %self.id(), "Queued ICE candidate rejected: {:#}", e);
            }
        }
        count
    }

    /// Release the underlying connection.
    pub async fn close(&self) {
        if let Err(e) = self.connection.close().await {
            warn!(peer = %self.id(), "Error closing peer connection: {:#}", e);
        }
        self.set_link_state(RTCPeerConnectionState::Closed);
    }
}
