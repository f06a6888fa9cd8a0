use crate::error::{SessionError, SessionResult};
use crate::handshake::controller_input::ControllerCommand;
use crate::handshake::filter::{Admission, RecentMessages, admit};
use crate::media::{LocalTrack, TrackSink};
use crate::peer::{CandidateDisposition, HandshakeState, Peer, PeerRegistry, PeerSide};
use crate::session::{LocalSession, Role, SessionStatus};
use crate::signaling::{SignalBus, Subscription};
use crate::transport::{ConnectionWrapper, TransportConfig, TransportEvent};
use airwave_core::{NewSignal, PeerId, SignalKind, SignalingMessage};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// What the local side brings to each connection.
pub enum RoleMedia {
    /// Tracks attached to every outgoing offer.
    Broadcaster { tracks: Vec<LocalTrack> },
    /// Receives every inbound track.
    Listener { sink: Arc<dyn TrackSink> },
}

impl RoleMedia {
    pub fn role(&self) -> Role {
        match self {
            RoleMedia::Broadcaster { .. } => Role::Broadcaster,
            RoleMedia::Listener { .. } => Role::Listener,
        }
    }
}

/// Event loop driving every handshake of one session.
///
/// Inbound signaling rows, connection events and commands are handled one at
/// a time, so steps for a peer never overlap and an offer is always
/// published before the candidates it produces.
pub struct HandshakeController {
    session: LocalSession,
    media: RoleMedia,
    bus: Arc<dyn SignalBus>,
    subscription: Subscription,
    registry: Arc<PeerRegistry>,
    transport_config: TransportConfig,
    transport_tx: mpsc::Sender<TransportEvent>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    command_rx: mpsc::Receiver<ControllerCommand>,
    status: Arc<watch::Sender<SessionStatus>>,
    recent: RecentMessages,
    next_epoch: u64,
}

impl HandshakeController {
    pub fn new(
        session: LocalSession,
        media: RoleMedia,
        bus: Arc<dyn SignalBus>,
        subscription: Subscription,
        registry: Arc<PeerRegistry>,
        transport_config: TransportConfig,
        status: Arc<watch::Sender<SessionStatus>>,
    ) -> (Self, mpsc::Sender<ControllerCommand>) {
        let (transport_tx, transport_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(8);

        let controller = Self {
            session,
            media,
            bus,
            subscription,
            registry,
            transport_config,
            transport_tx,
            transport_rx,
            command_rx,
            status,
            recent: RecentMessages::default(),
            next_epoch: 0,
        };
        (controller, command_tx)
    }

    pub fn role(&self) -> Role {
        self.media.role()
    }

    pub async fn run(mut self) {
        info!(
            room = %self.session.room_id,
            local = %self.session.local_id,
            role = %self.role(),
            "Handshake loop started"
        );

        let ack = loop {
            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ControllerCommand::Shutdown { ack }) => break Some(ack),
                        None => {
                            info!("Command channel closed. Shutting down handshake loop.");
                            break None;
                        }
                    }
                }

                evt = self.transport_rx.recv() => {
                    match evt {
                        Some(e) => self.handle_transport_event(e).await,
                        None => {
                            warn!("Transport channel closed unexpectedly");
                            break None;
                        }
                    }
                }

                msg = self.subscription.recv() => {
                    match msg {
                        Some(m) => self.handle_message(m).await,
                        None => {
                            error!(room = %self.session.room_id, "Signaling subscription ended");
                            break None;
                        }
                    }
                }
            }
        };

        let closed = self.registry.remove_all().await;
        self.refresh_status();
        if let Some(ack) = ack {
            let _ = ack.send(closed);
        }
        info!(closed, "Handshake loop finished");
    }

    async fn handle_message(&mut self, msg: SignalingMessage) {
        match admit(&msg, &self.session.local_id) {
            Admission::Accept => {}
            verdict => {
                debug!(kind = %msg.kind, from = %msg.sender_id, ?verdict, "Skipping row");
                return;
            }
        }
        if !self.recent.first_sighting(&msg) {
            debug!(kind = %msg.kind, from = %msg.sender_id, "Duplicate delivery ignored");
            return;
        }

        debug!(kind = %msg.kind, from = %msg.sender_id, "Signaling message");
        let remote = msg.sender_id.clone();

        let result = match (self.role(), &msg.kind) {
            (Role::Broadcaster, SignalKind::JoinRequest) => self.on_join_request(&remote).await,
            (Role::Listener, SignalKind::Offer) => self.on_offer(&remote, &msg).await,
            (Role::Broadcaster, SignalKind::Answer) => self.on_answer(&remote, &msg).await,
            (_, SignalKind::IceCandidate) => self.on_remote_candidate(&remote, &msg).await,
            (role, kind) => {
                debug!(%role, %kind, "No handler for message");
                Ok(())
            }
        };

        if let Err(e) = result {
            self.handle_step_error(&remote, e).await;
        }
    }

    async fn handle_step_error(&mut self, remote: &PeerId, err: SessionError) {
        match err {
            SessionError::Protocol { .. } => warn!("Dropping message: {}", err),
            SessionError::Transport(_) => {
                warn!(peer = %remote, "Handshake step abandoned: {}", err)
            }
            _ => {
                error!(peer = %remote, "Handshake failed: {}", err);
                if let Some(peer) = self.registry.get(remote) {
                    peer.fail();
                }
                self.registry.remove(remote).await;
                self.refresh_status();
            }
        }
    }

    /// Broadcaster side: a listener asked to join.
    async fn on_join_request(&mut self, remote: &PeerId) -> SessionResult<()> {
        let RoleMedia::Broadcaster { tracks } = &self.media else {
            return Ok(());
        };
        let tracks = tracks.clone();

        if self.registry.remove(remote).await {
            info!(peer = %remote, "Listener rejoined, replacing connection");
            self.refresh_status();
        }

        let peer = self.open_peer(remote, PeerSide::Offerer).await?;
        let sdp = async {
            peer.connection().add_tracks(&tracks).await?;
            peer.connection().create_offer().await
        }
        .await
        .map_err(|e| SessionError::peer_connection(remote, e))?;

        self.bus
            .publish(NewSignal::offer(
                self.session.room_id.clone(),
                self.session.local_id.clone(),
                remote.clone(),
                sdp,
            ))
            .await?;
        peer.advance(HandshakeState::OfferSent);
        info!(peer = %remote, epoch = peer.epoch(), "Offer sent");
        Ok(())
    }

    /// Listener side: a broadcaster offered a connection.
    async fn on_offer(&mut self, remote: &PeerId, msg: &SignalingMessage) -> SessionResult<()> {
        let offer = msg
            .sdp()
            .map_err(|e| SessionError::protocol(remote, format!("bad offer payload: {e}")))?;
        if offer.sdp.trim().is_empty() {
            return Err(SessionError::protocol(remote, "empty offer SDP"));
        }

        if self.registry.remove(remote).await {
            info!(peer = %remote, "New offer, replacing connection");
            self.refresh_status();
        }

        let peer = self.open_peer(remote, PeerSide::Answerer).await?;
        let flushed = peer
            .apply_remote_offer(offer.sdp)
            .await
            .map_err(|e| SessionError::peer_connection(remote, e))?;
        peer.advance(HandshakeState::OfferReceived);
        if flushed > 0 {
            debug!(peer = %remote, flushed, "Applied queued candidates");
        }

        let sdp = peer
            .connection()
            .create_answer()
            .await
            .map_err(|e| SessionError::peer_connection(remote, e))?;

        self.bus
            .publish(NewSignal::answer(
                self.session.room_id.clone(),
                self.session.local_id.clone(),
                remote.clone(),
                sdp,
            ))
            .await?;
        peer.advance(HandshakeState::AnswerSent);
        info!(peer = %remote, epoch = peer.epoch(), "Answer sent");
        Ok(())
    }

    /// Broadcaster side: a listener answered our offer.
    async fn on_answer(&mut self, remote: &PeerId, msg: &SignalingMessage) -> SessionResult<()> {
        let Some(peer) = self.registry.get(remote) else {
            warn!(peer = %remote, "Answer from unknown peer");
            return Ok(());
        };
        if peer.handshake() != HandshakeState::OfferSent {
            debug!(peer = %remote, state = %peer.handshake(), "Answer not expected, ignoring");
            return Ok(());
        }

        let answer = msg
            .sdp()
            .map_err(|e| SessionError::protocol(remote, format!("bad answer payload: {e}")))?;
        let flushed = peer
            .apply_remote_answer(answer.sdp)
            .await
            .map_err(|e| SessionError::peer_connection(remote, e))?;
        peer.advance(HandshakeState::AnswerReceived);
        info!(peer = %remote, flushed, "Answer applied");
        Ok(())
    }

    async fn on_remote_candidate(
        &mut self,
        remote: &PeerId,
        msg: &SignalingMessage,
    ) -> SessionResult<()> {
        let Some(peer) = self.registry.get(remote) else {
            debug!(peer = %remote, "Candidate for unknown peer dropped");
            return Ok(());
        };
        let candidate = msg
            .candidate()
            .map_err(|e| SessionError::protocol(remote, format!("bad candidate payload: {e}")))?;
        let Some(candidate) = candidate else {
            debug!(peer = %remote, "End-of-candidates marker");
            return Ok(());
        };

        match peer.add_remote_candidate(candidate).await {
            Ok(CandidateDisposition::Applied) => debug!(peer = %remote, "Candidate applied"),
            Ok(CandidateDisposition::Queued) => {
                debug!(peer = %remote, queued = peer.pending_candidate_count(), "Candidate queued")
            }
            Err(e) => warn!(peer = %remote, "Candidate rejected: {:#}", e),
        }
        Ok(())
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::CandidateGenerated {
                peer_id,
                epoch,
                candidate,
            } => {
                if self.registry.get_current(&peer_id, epoch).is_none() {
                    return;
                }
                let signal = NewSignal::ice_candidate(
                    self.session.room_id.clone(),
                    self.session.local_id.clone(),
                    peer_id.clone(),
                    candidate,
                );
                if let Err(e) = self.bus.publish(signal).await {
                    warn!(peer = %peer_id, "Failed to publish candidate: {}", e);
                }
            }

            TransportEvent::StateChanged {
                peer_id,
                epoch,
                state,
            } => {
                let Some(peer) = self.registry.get_current(&peer_id, epoch) else {
                    debug!(peer = %peer_id, epoch, "State change for stale connection");
                    return;
                };
                peer.set_link_state(state);

                match state {
                    RTCPeerConnectionState::Connected => {
                        peer.advance(HandshakeState::Connected);
                        info!(peer = %peer_id, "Peer connected");
                    }
                    // Our own closes deregister first, so Closed here came from below.
                    RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Closed => {
                        peer.fail();
                        warn!(peer = %peer_id, ?state, "Peer lost, evicting");
                        self.registry.remove_current(&peer_id, epoch).await;
                    }
                    _ => {}
                }
                self.refresh_status();
            }

            TransportEvent::TrackReceived {
                peer_id,
                epoch,
                track,
            } => {
                if self.registry.get_current(&peer_id, epoch).is_none() {
                    return;
                }
                if let RoleMedia::Listener { sink } = &self.media {
                    sink.attach(peer_id, track);
                    self.status.send_if_modified(|s| {
                        let changed = !s.receiving_audio;
                        s.receiving_audio = true;
                        changed
                    });
                }
            }
        }
    }

    async fn open_peer(&mut self, remote: &PeerId, side: PeerSide) -> SessionResult<Arc<Peer>> {
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let config = &self.transport_config;
        let events = self.transport_tx.clone();

        self.registry
            .upsert(remote.clone(), || async move {
                let conn = ConnectionWrapper::new(remote.clone(), epoch, config, events).await?;
                Ok::<_, anyhow::Error>(Peer::new(conn, side))
            })
            .await
            .map_err(|e| SessionError::peer_connection(remote, e))
    }

    fn refresh_status(&self) {
        let connected = self.registry.connected_count();
        let any_peers = !self.registry.is_empty();
        self.status.send_if_modified(|s| {
            let receiving = s.receiving_audio && any_peers;
            let changed = s.connected_peers != connected || s.receiving_audio != receiving;
            s.connected_peers = connected;
            s.receiving_audio = receiving;
            changed
        });
    }
}
