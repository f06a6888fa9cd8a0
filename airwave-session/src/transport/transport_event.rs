use airwave_core::{IceCandidatePayload, PeerId};
use std::sync::Arc;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::track::track_remote::TrackRemote;

/// Events a peer connection reports back to the handshake loop.
///
/// `epoch` identifies the connection instance; a replaced or closed
/// connection keeps reporting under its old epoch and is ignored.
pub enum TransportEvent {
    /// A local ICE candidate was gathered and must be sent to the peer.
    CandidateGenerated {
        peer_id: PeerId,
        epoch: u64,
        candidate: IceCandidatePayload,
    },

    StateChanged {
        peer_id: PeerId,
        epoch: u64,
        state: RTCPeerConnectionState,
    },

    /// Remote audio arrived (listener side).
    TrackReceived {
        peer_id: PeerId,
        epoch: u64,
        track: Arc<TrackRemote>,
    },
}
