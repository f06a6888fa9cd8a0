use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("capture permission denied by {device}")]
    PermissionDenied { device: String },

    #[error("capture device error: {0}")]
    Device(String),

    #[error("playlist is empty")]
    EmptyPlaylist,

    #[error("cannot read {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },
}

/// Constraints requested from a capture device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: 48_000,
            channels: 1,
        }
    }
}

pub type LocalTrack = Arc<dyn TrackLocal + Send + Sync>;

/// Where a broadcaster's outbound audio comes from.
///
/// `acquire` is called once when broadcasting starts and the returned tracks
/// are attached to every peer connection. `release` stops production.
#[async_trait]
pub trait MediaSource: Send + Sync {
    fn describe(&self) -> String;

    async fn acquire(&mut self) -> Result<Vec<LocalTrack>, MediaError>;

    async fn release(&mut self);
}

/// Opus sample track shared by all peers of a broadcast.
pub(crate) fn opus_track(
    sample_rate: u32,
    channels: u16,
    stream_id: &str,
) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: sample_rate,
            channels,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
            rtcp_feedback: vec![],
        },
        "audio".to_owned(),
        stream_id.to_owned(),
    ))
}
