use crate::error::{SessionError, SessionResult};
use crate::handshake::{ControllerCommand, HandshakeController, RoleMedia};
use crate::media::{MediaSource, PacketCounterSink, TrackSink};
use crate::peer::PeerRegistry;
use crate::session::session_status::{LocalSession, Role, SessionStatus};
use crate::signaling::{SignalBus, Subscription};
use crate::transport::TransportConfig;
use airwave_core::{NewSignal, PeerId, RoomId};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct ActiveSession {
    session: LocalSession,
    role: Role,
    command_tx: mpsc::Sender<ControllerCommand>,
    task: JoinHandle<()>,
    media: Option<Box<dyn MediaSource>>,
}

/// Entry point for one participant: broadcast to a room, listen to one, or
/// sit idle. At most one session is active at a time.
pub struct SessionManager {
    bus: Arc<dyn SignalBus>,
    transport_config: TransportConfig,
    registry: Arc<PeerRegistry>,
    status_tx: Arc<watch::Sender<SessionStatus>>,
    sink: Arc<dyn TrackSink>,
    active: Option<ActiveSession>,
}

impl SessionManager {
    pub fn new(bus: Arc<dyn SignalBus>, transport_config: TransportConfig) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::default());
        Self {
            bus,
            transport_config,
            registry: Arc::new(PeerRegistry::new()),
            status_tx: Arc::new(status_tx),
            sink: Arc::new(PacketCounterSink::new()),
            active: None,
        }
    }

    /// Replaces the sink inbound tracks are handed to while listening.
    pub fn with_sink(mut self, sink: Arc<dyn TrackSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Acquires `source` and starts answering join requests in `room`.
    pub async fn start_broadcast(
        &mut self,
        room: RoomId,
        local: PeerId,
        mut source: Box<dyn MediaSource>,
    ) -> SessionResult<()> {
        validate(&room, &local)?;
        self.ensure_idle()?;

        let tracks = source.acquire().await?;
        let subscription = match self.bus.subscribe_room(&room).await {
            Ok(s) => s,
            Err(e) => {
                source.release().await;
                return Err(e.into());
            }
        };

        info!(room = %room, local = %local, source = %source.describe(), "Broadcast started");
        let session = LocalSession::new(room, local);
        self.spawn(
            session,
            RoleMedia::Broadcaster { tracks },
            subscription,
            Some(source),
        );
        Ok(())
    }

    /// Subscribes to `room` and announces this listener with a join request.
    ///
    /// A failed announcement is returned as `Transport` but leaves the
    /// session listening; call `stop` to abandon it.
    pub async fn join_as_listener(&mut self, room: RoomId, local: PeerId) -> SessionResult<()> {
        validate(&room, &local)?;
        self.ensure_idle()?;

        let subscription = self.bus.subscribe_room(&room).await?;
        let session = LocalSession::new(room.clone(), local.clone());
        self.spawn(
            session,
            RoleMedia::Listener {
                sink: Arc::clone(&self.sink),
            },
            subscription,
            None,
        );

        info!(room = %room, local = %local, "Listening");
        self.bus
            .publish(NewSignal::join_request(room, local))
            .await?;
        Ok(())
    }

    /// Ends the active session. Returns how many peers were closed. Calling
    /// it while idle is a no-op.
    pub async fn stop(&mut self) -> usize {
        let Some(active) = self.active.take() else {
            return 0;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        let closed = if active
            .command_tx
            .send(ControllerCommand::Shutdown { ack: ack_tx })
            .await
            .is_ok()
        {
            ack_rx.await.unwrap_or(0)
        } else {
            0
        };

        if let Err(e) = active.task.await {
            warn!("Handshake loop ended abnormally: {}", e);
        }
        // The loop may have exited on its own before the shutdown arrived.
        let closed = closed + self.registry.remove_all().await;

        if let Some(mut media) = active.media {
            media.release().await;
        }
        self.status_tx.send_replace(SessionStatus::default());

        info!(
            room = %active.session.room_id,
            role = %active.role,
            closed,
            "Session stopped"
        );
        closed
    }

    pub fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn role(&self) -> Role {
        self.active.as_ref().map_or(Role::Idle, |a| a.role)
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    fn ensure_idle(&self) -> SessionResult<()> {
        match &self.active {
            Some(active) => Err(SessionError::InvalidState(active.role)),
            None => Ok(()),
        }
    }

    fn spawn(
        &mut self,
        session: LocalSession,
        media: RoleMedia,
        subscription: Subscription,
        source: Option<Box<dyn MediaSource>>,
    ) {
        let role = media.role();
        self.status_tx
            .send_replace(SessionStatus::active(role, &session));

        let (controller, command_tx) = HandshakeController::new(
            session.clone(),
            media,
            Arc::clone(&self.bus),
            subscription,
            Arc::clone(&self.registry),
            self.transport_config.clone(),
            Arc::clone(&self.status_tx),
        );

        self.active = Some(ActiveSession {
            session,
            role,
            command_tx,
            task: tokio::spawn(controller.run()),
            media: source,
        });
    }
}

/// Best-effort teardown for a session that was never stopped: the loop is
/// cancelled, then every peer is closed and the media released on the
/// current runtime.
impl Drop for SessionManager {
    fn drop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        warn!(room = %active.session.room_id, "Session dropped without stop");
        active.task.abort();
        self.status_tx.send_replace(SessionStatus::default());

        let Ok(runtime) = Handle::try_current() else {
            warn!(
                room = %active.session.room_id,
                peers = self.registry.len(),
                "No runtime to tear down dropped session"
            );
            return;
        };

        let registry = Arc::clone(&self.registry);
        let room = active.session.room_id;
        let task = active.task;
        let media = active.media;
        runtime.spawn(async move {
            // Wait out the cancelled loop so it cannot register a peer after the sweep.
            let _ = task.await;
            let closed = registry.remove_all().await;
            if let Some(mut media) = media {
                media.release().await;
            }
            info!(room = %room, closed, "Dropped session torn down");
        });
    }
}

fn validate(room: &RoomId, local: &PeerId) -> SessionResult<()> {
    if room.is_blank() {
        return Err(SessionError::Validation("room id must not be empty".into()));
    }
    if local.is_blank() {
        return Err(SessionError::Validation("user id must not be empty".into()));
    }
    Ok(())
}
