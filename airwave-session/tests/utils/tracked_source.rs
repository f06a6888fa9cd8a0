use airwave_session::media::{LocalTrack, MediaError, MediaSource};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts acquire/release calls of the wrapped source.
pub struct TrackedSource {
    inner: Box<dyn MediaSource>,
    counters: SourceCounters,
}

#[derive(Clone, Default)]
pub struct SourceCounters {
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl SourceCounters {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl TrackedSource {
    pub fn wrap(inner: Box<dyn MediaSource>) -> (Box<dyn MediaSource>, SourceCounters) {
        let counters = SourceCounters::default();
        let source = Self {
            inner,
            counters: counters.clone(),
        };
        (Box::new(source), counters)
    }
}

#[async_trait]
impl MediaSource for TrackedSource {
    fn describe(&self) -> String {
        format!("tracked {}", self.inner.describe())
    }

    async fn acquire(&mut self) -> Result<Vec<LocalTrack>, MediaError> {
        let tracks = self.inner.acquire().await?;
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(tracks)
    }

    async fn release(&mut self) {
        self.inner.release().await;
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}
