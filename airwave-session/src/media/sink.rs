use airwave_core::PeerId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info};
use webrtc::track::track_remote::TrackRemote;

/// Consumer of inbound audio on the listening side.
pub trait TrackSink: Send + Sync {
    /// Called once per remote track. Implementations own reading it.
    fn attach(&self, peer_id: PeerId, track: Arc<TrackRemote>);
}

#[derive(Debug, Default)]
struct PacketStats {
    tracks: AtomicUsize,
    packets: AtomicU64,
    bytes: AtomicU64,
}

/// Drains RTP and counts what arrives. Default sink for listeners.
#[derive(Debug, Clone, Default)]
pub struct PacketCounterSink {
    stats: Arc<PacketStats>,
}

impl PacketCounterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> usize {
        self.stats.tracks.load(Ordering::Relaxed)
    }

    pub fn packets(&self) -> u64 {
        self.stats.packets.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.stats.bytes.load(Ordering::Relaxed)
    }
}

impl TrackSink for PacketCounterSink {
    fn attach(&self, peer_id: PeerId, track: Arc<TrackRemote>) {
        self.stats.tracks.fetch_add(1, Ordering::Relaxed);
        info!(peer = %peer_id, ssrc = track.ssrc(), "Receiving audio");

        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            while let Ok((packet, _)) = track.read_rtp().await {
                stats.packets.fetch_add(1, Ordering::Relaxed);
                stats
                    .bytes
                    .fetch_add(packet.payload.len() as u64, Ordering::Relaxed);
            }
            debug!(peer = %peer_id, "Inbound track ended");
        });
    }
}
