use crate::signaling::{BusError, SignalBus, Subscription};
use airwave_core::{NewSignal, PeerId, RoomId, SignalKind, SignalingMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Channel the insert trigger notifies on.
pub const NOTIFY_CHANNEL: &str = "airwave_signaling";

/// Table, index and insert trigger. Each entry is one statement.
pub const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS signaling (
        id          BIGSERIAL PRIMARY KEY,
        room_id     TEXT NOT NULL,
        sender_id   TEXT NOT NULL,
        receiver_id TEXT,
        type        TEXT NOT NULL,
        payload     JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS signaling_room_created_idx ON signaling (room_id, created_at)",
    "CREATE OR REPLACE FUNCTION airwave_notify_signaling() RETURNS trigger AS $$
     BEGIN
         PERFORM pg_notify('airwave_signaling',
             json_build_object('id', NEW.id, 'room_id', NEW.room_id)::text);
         RETURN NEW;
     END;
     $$ LANGUAGE plpgsql",
    "DROP TRIGGER IF EXISTS signaling_notify ON signaling",
    "CREATE TRIGGER signaling_notify AFTER INSERT ON signaling
     FOR EACH ROW EXECUTE FUNCTION airwave_notify_signaling()",
];

const SELECT_BY_ID: &str = "SELECT room_id, sender_id, receiver_id, type, payload, created_at \
                            FROM signaling WHERE id = $1";

/// Body of an insert notification. The row itself is loaded by id so SDP
/// payloads never hit the NOTIFY size limit.
#[derive(Debug, Deserialize, PartialEq)]
pub struct InsertNotice {
    pub id: i64,
    pub room_id: String,
}

impl InsertNotice {
    pub fn parse(raw: &str) -> Result<Self, BusError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Signaling over a PostgreSQL table and its insert notifications.
#[derive(Clone)]
pub struct PgSignalBus {
    pool: PgPool,
}

impl PgSignalBus {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, BusError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!(max_connections, "connected to signaling database");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), BusError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("signaling schema applied");
        Ok(())
    }

    async fn fetch(pool: &PgPool, id: i64) -> Result<Option<SignalingMessage>, BusError> {
        let row = sqlx::query(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(|r| row_to_message(&r)).transpose()?)
    }
}

fn row_to_message(row: &PgRow) -> Result<SignalingMessage, sqlx::Error> {
    let room_id: String = row.try_get("room_id")?;
    let sender_id: String = row.try_get("sender_id")?;
    let receiver_id: Option<String> = row.try_get("receiver_id")?;
    let kind: String = row.try_get("type")?;
    let Json(payload): Json<Value> = row.try_get("payload")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(SignalingMessage {
        room_id: RoomId(room_id),
        sender_id: PeerId(sender_id),
        receiver_id: receiver_id.map(PeerId),
        kind: SignalKind::from(kind),
        payload,
        created_at,
    })
}

#[async_trait]
impl SignalBus for PgSignalBus {
    async fn publish(&self, signal: NewSignal) -> Result<SignalingMessage, BusError> {
        let row = sqlx::query(
            "INSERT INTO signaling (room_id, sender_id, receiver_id, type, payload) \
             VALUES ($1, $2, $3, $4, $5) RETURNING created_at",
        )
        .bind(signal.room_id.as_str())
        .bind(signal.sender_id.as_str())
        .bind(signal.receiver_id.as_ref().map(|r| r.as_str()))
        .bind(signal.kind.as_str())
        .bind(Json(&signal.payload))
        .fetch_one(&self.pool)
        .await?;

        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        Ok(signal.into_message(created_at))
    }

    async fn subscribe_room(&self, room: &RoomId) -> Result<Subscription, BusError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let pool = self.pool.clone();
        let room_id = room.clone();

        let task = tokio::spawn(async move {
            loop {
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(e) => {
                        error!(room = %room_id, "signaling listener stopped: {}", e);
                        break;
                    }
                };

                let notice = match InsertNotice::parse(notification.payload()) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("Ignoring malformed insert notice: {}", e);
                        continue;
                    }
                };
                if notice.room_id != room_id.as_str() {
                    continue;
                }

                match PgSignalBus::fetch(&pool, notice.id).await {
                    Ok(Some(message)) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    Ok(None) => debug!(id = notice.id, "row purged before it was read"),
                    Err(e) => warn!(id = notice.id, "failed to load signaling row: {}", e),
                }
            }
        });

        info!(room = %room, "subscribed to signaling notifications");
        Ok(Subscription::new(room.clone(), rx, move || task.abort()))
    }

    async fn purge_older_than(&self, max_age: Duration) -> Result<u64, BusError> {
        let result = sqlx::query(
            "DELETE FROM signaling WHERE created_at < now() - ($1::double precision * interval '1 second')",
        )
        .bind(max_age.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
