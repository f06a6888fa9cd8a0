use crate::signaling::{BusError, SignalBus, Subscription};
use airwave_core::{NewSignal, RoomId, SignalingMessage};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

struct Subscriber {
    room_id: RoomId,
    tx: mpsc::UnboundedSender<SignalingMessage>,
}

struct MemoryInner {
    rows: Mutex<Vec<SignalingMessage>>,
    subscribers: DashMap<u64, Subscriber>,
    next_subscriber: AtomicU64,
    offline: AtomicBool,
}

/// In-process signaling table with push fan-out.
///
/// Rows are delivered to every matching subscriber in insert order.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<MemoryInner>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                rows: Mutex::new(Vec::new()),
                subscribers: DashMap::new(),
                next_subscriber: AtomicU64::new(1),
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// While offline every publish and subscribe fails.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<SignalingMessage> {
        self.inner.rows.lock().clone()
    }

    pub fn row_count(&self) -> usize {
        self.inner.rows.lock().len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Re-deliver an already stored row, as a backend retry would.
    pub fn redeliver(&self, message: &SignalingMessage) {
        let _rows = self.inner.rows.lock();
        self.fan_out(message);
    }

    fn ensure_online(&self) -> Result<(), BusError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("memory bus is offline".into()));
        }
        Ok(())
    }

    fn fan_out(&self, message: &SignalingMessage) {
        self.inner.subscribers.retain(|_, sub| {
            if sub.room_id != message.room_id {
                return true;
            }
            sub.tx.send(message.clone()).is_ok()
        });
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalBus for MemoryBus {
    async fn publish(&self, signal: NewSignal) -> Result<SignalingMessage, BusError> {
        self.ensure_online()?;

        let message = signal.into_message(Utc::now());

        // Fan out under the table lock so delivery order matches insert order.
        let mut rows = self.inner.rows.lock();
        rows.push(message.clone());
        self.fan_out(&message);
        drop(rows);

        debug!(room = %message.room_id, kind = %message.kind, "row inserted");
        Ok(message)
    }

    async fn subscribe_room(&self, room: &RoomId) -> Result<Subscription, BusError> {
        self.ensure_online()?;

        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.insert(
            id,
            Subscriber {
                room_id: room.clone(),
                tx,
            },
        );

        let inner = Arc::downgrade(&self.inner);
        Ok(Subscription::new(room.clone(), rx, move || {
            if let Some(inner) = inner.upgrade() {
                inner.subscribers.remove(&id);
            }
        }))
    }

    async fn purge_older_than(&self, max_age: Duration) -> Result<u64, BusError> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| BusError::Unavailable(format!("retention window out of range: {e}")))?;
        let cutoff = Utc::now() - max_age;

        let mut rows = self.inner.rows.lock();
        let before = rows.len();
        rows.retain(|row| row.created_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}
