use airwave_core::{NewSignal, RoomId, SignalingMessage};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("signaling backend unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed signaling row: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Out-of-band channel the handshake runs over.
///
/// Delivery is at-least-once with no cross-subscriber ordering. `publish`
/// returning does not mean any subscriber has seen the row.
#[async_trait]
pub trait SignalBus: Send + Sync {
    /// Insert a row. `created_at` is assigned by the backend.
    async fn publish(&self, signal: NewSignal) -> Result<SignalingMessage, BusError>;

    /// Push subscription to every row inserted into `room` from now on.
    async fn subscribe_room(&self, room: &RoomId) -> Result<Subscription, BusError>;

    /// Delete rows older than `max_age`. Storage hygiene only.
    async fn purge_older_than(&self, max_age: Duration) -> Result<u64, BusError>;
}

/// Handle to a room subscription. Dropping it unsubscribes.
pub struct Subscription {
    room_id: RoomId,
    rx: mpsc::UnboundedReceiver<SignalingMessage>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(room_id: RoomId, rx: mpsc::UnboundedReceiver<SignalingMessage>, cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            room_id,
            rx,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Next row for the room. `None` once the backend side has gone away.
    pub async fn recv(&mut self) -> Option<SignalingMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SignalingMessage> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
            debug!(room = %self.room_id, "Unsubscribed");
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}
