use crate::media::MediaError;
use crate::session::Role;
use crate::signaling::BusError;
use airwave_core::PeerId;
use thiserror::Error;

/// Failures surfaced by session operations and handshake steps.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Empty room or user identifier. Rejected before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("media source unavailable: {0}")]
    MediaAccess(#[from] MediaError),

    #[error("signaling transport failed: {0}")]
    Transport(#[from] BusError),

    /// Malformed or unexpected signaling payload. The message is dropped.
    #[error("protocol violation from {peer}: {reason}")]
    Protocol { peer: PeerId, reason: String },

    #[error("peer connection to {peer} failed: {reason}")]
    PeerConnection { peer: PeerId, reason: String },

    #[error("session already active as {0}")]
    InvalidState(Role),
}

impl SessionError {
    pub(crate) fn protocol(peer: &PeerId, reason: impl ToString) -> Self {
        Self::Protocol {
            peer: peer.clone(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn peer_connection(peer: &PeerId, err: anyhow::Error) -> Self {
        Self::PeerConnection {
            peer: peer.clone(),
            reason: format!("{err:#}"),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
