use crate::media::source::{CaptureConstraints, LocalTrack, MediaError, MediaSource, opus_track};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::media::Sample;

pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// One 20 ms Opus frame of silence (TOC byte plus an empty payload).
pub const OPUS_SILENCE_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];

/// Encoded Opus frames, one per `FRAME_DURATION`. The device stops when the
/// receiver is dropped.
pub type FrameStream = mpsc::Receiver<Bytes>;

/// An audio input the user has to grant access to.
pub trait CaptureDevice: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self, constraints: &CaptureConstraints) -> Result<FrameStream, MediaError>;
}

/// Device that always grants access and produces Opus silence.
#[derive(Debug, Default)]
pub struct SilentCapture;

impl CaptureDevice for SilentCapture {
    fn name(&self) -> &str {
        "silence"
    }

    fn open(&self, _constraints: &CaptureConstraints) -> Result<FrameStream, MediaError> {
        let (tx, rx) = mpsc::channel(50);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FRAME_DURATION);
            loop {
                ticker.tick().await;
                if tx
                    .send(Bytes::from_static(&OPUS_SILENCE_FRAME))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// Device whose user refused the permission prompt.
#[derive(Debug, Default)]
pub struct DeniedCapture;

impl CaptureDevice for DeniedCapture {
    fn name(&self) -> &str {
        "denied"
    }

    fn open(&self, _constraints: &CaptureConstraints) -> Result<FrameStream, MediaError> {
        Err(MediaError::PermissionDenied {
            device: self.name().to_owned(),
        })
    }
}

/// Live capture from a `CaptureDevice`, sent as a single Opus track.
pub struct MicrophoneSource {
    device: Box<dyn CaptureDevice>,
    constraints: CaptureConstraints,
    pump: Option<JoinHandle<()>>,
}

impl MicrophoneSource {
    pub fn new(device: Box<dyn CaptureDevice>, constraints: CaptureConstraints) -> Self {
        Self {
            device,
            constraints,
            pump: None,
        }
    }

    pub fn constraints(&self) -> &CaptureConstraints {
        &self.constraints
    }

    pub fn is_capturing(&self) -> bool {
        self.pump.as_ref().is_some_and(|p| !p.is_finished())
    }
}

#[async_trait]
impl MediaSource for MicrophoneSource {
    fn describe(&self) -> String {
        format!("microphone ({})", self.device.name())
    }

    async fn acquire(&mut self) -> Result<Vec<LocalTrack>, MediaError> {
        if self.pump.is_some() {
            return Err(MediaError::Device("capture already running".into()));
        }

        let mut frames = self.device.open(&self.constraints)?;
        let track = opus_track(
            self.constraints.sample_rate,
            self.constraints.channels,
            "airwave-microphone",
        );

        let writer = track.clone();
        self.pump = Some(tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let sample = Sample {
                    data: frame,
                    duration: FRAME_DURATION,
                    ..Default::default()
                };
                if let Err(e) = writer.write_sample(&sample).await {
                    warn!("Dropping capture frame: {}", e);
                }
            }
            debug!("Capture stream ended");
        }));

        info!(device = self.device.name(), constraints = ?self.constraints, "Capture started");
        let track: LocalTrack = track;
        Ok(vec![track])
    }

    async fn release(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
            info!(device = self.device.name(), "Capture stopped");
        }
    }
}
