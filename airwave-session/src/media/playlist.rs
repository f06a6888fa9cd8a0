use crate::media::microphone::FRAME_DURATION;
use crate::media::source::{LocalTrack, MediaError, MediaSource, opus_track};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use webrtc::media::Sample;
use webrtc::media::io::ogg_reader::OggReader;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Opus granule positions always count 48 kHz samples.
const OPUS_GRANULE_RATE: u64 = 48_000;

/// Position in a non-empty playlist. Advancing past the last entry wraps.
#[derive(Debug, Clone)]
pub struct PlaylistCursor {
    entries: Vec<PathBuf>,
    position: usize,
    laps: u64,
}

impl PlaylistCursor {
    pub fn new(entries: Vec<PathBuf>) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        Some(Self {
            entries,
            position: 0,
            laps: 0,
        })
    }

    pub fn current(&self) -> &Path {
        &self.entries[self.position]
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Completed passes over the whole list.
    pub fn laps(&self) -> u64 {
        self.laps
    }

    pub fn advance(&mut self) -> &Path {
        self.position = (self.position + 1) % self.entries.len();
        if self.position == 0 {
            self.laps += 1;
        }
        self.current()
    }
}

/// Ogg/Opus files streamed back to back on one track, looping forever.
pub struct PlaylistSource {
    entries: Vec<PathBuf>,
    player: Option<JoinHandle<()>>,
    now_playing: Arc<Mutex<Option<PathBuf>>>,
}

impl PlaylistSource {
    pub fn new(entries: Vec<PathBuf>) -> Self {
        Self {
            entries,
            player: None,
            now_playing: Arc::new(Mutex::new(None)),
        }
    }

    pub fn now_playing(&self) -> Option<PathBuf> {
        self.now_playing.lock().clone()
    }

    pub fn is_playing(&self) -> bool {
        self.player.as_ref().is_some_and(|p| !p.is_finished())
    }
}

#[async_trait]
impl MediaSource for PlaylistSource {
    fn describe(&self) -> String {
        format!("playlist ({} files)", self.entries.len())
    }

    async fn acquire(&mut self) -> Result<Vec<LocalTrack>, MediaError> {
        let Some(cursor) = PlaylistCursor::new(self.entries.clone()) else {
            return Err(MediaError::EmptyPlaylist);
        };
        if self.player.is_some() {
            return Err(MediaError::Device("playlist already playing".into()));
        }
        for path in &self.entries {
            open_ogg(path)?;
        }

        let track = opus_track(OPUS_GRANULE_RATE as u32, 2, "airwave-playlist");
        self.player = Some(tokio::spawn(play(
            cursor,
            track.clone(),
            Arc::clone(&self.now_playing),
        )));

        info!(files = self.entries.len(), "Playlist started");
        let track: LocalTrack = track;
        Ok(vec![track])
    }

    async fn release(&mut self) {
        if let Some(player) = self.player.take() {
            player.abort();
            *self.now_playing.lock() = None;
            info!("Playlist stopped");
        }
    }
}

fn open_ogg(path: &Path) -> Result<OggReader<BufReader<File>>, MediaError> {
    let unreadable = |reason: String| MediaError::Unreadable {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|e| unreadable(e.to_string()))?;
    let (reader, _header) =
        OggReader::new(BufReader::new(file), true).map_err(|e| unreadable(e.to_string()))?;
    Ok(reader)
}

async fn play(
    mut cursor: PlaylistCursor,
    track: Arc<TrackLocalStaticSample>,
    now_playing: Arc<Mutex<Option<PathBuf>>>,
) {
    let mut clock = Instant::now();
    loop {
        let path = cursor.current().to_path_buf();
        *now_playing.lock() = Some(path.clone());
        info!(file = %path.display(), position = cursor.position(), lap = cursor.laps(), "Now playing");

        match stream_file(&path, &track, &mut clock).await {
            Ok(pages) if pages > 0 => debug!(file = %path.display(), pages, "Finished file"),
            Ok(_) => {
                warn!(file = %path.display(), "No audio pages, skipping");
                tokio::time::sleep(FRAME_DURATION).await;
                clock = Instant::now();
            }
            Err(e) => {
                warn!("Skipping playlist entry: {}", e);
                tokio::time::sleep(FRAME_DURATION).await;
                clock = Instant::now();
            }
        }
        cursor.advance();
    }
}

/// Writes the audio pages of one file to `track` in real time. Each page is
/// held for the span its granule position covers; `clock` carries the
/// schedule from file to file. Returns the number of audio pages written.
async fn stream_file(
    path: &Path,
    track: &TrackLocalStaticSample,
    clock: &mut Instant,
) -> Result<u64, MediaError> {
    let mut ogg = open_ogg(path)?;
    let mut last_granule = 0u64;
    let mut pages = 0u64;

    while let Ok((page, header)) = ogg.parse_next_page() {
        // Header pages (OpusTags and its continuations) sit at granule 0.
        if header.granule_position == 0 {
            continue;
        }
        let sample_count = header.granule_position.saturating_sub(last_granule);
        last_granule = header.granule_position;
        if sample_count == 0 {
            continue;
        }

        let duration = Duration::from_micros(sample_count * 1_000_000 / OPUS_GRANULE_RATE);
        let sample = Sample {
            data: page.freeze(),
            duration,
            ..Default::default()
        };
        track
            .write_sample(&sample)
            .await
            .map_err(|e| MediaError::Device(e.to_string()))?;
        pages += 1;

        *clock += duration;
        tokio::time::sleep_until(*clock).await;
    }
    Ok(pages)
}
