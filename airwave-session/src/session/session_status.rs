use airwave_core::{PeerId, RoomId};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Idle,
    Broadcaster,
    Listener,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Idle => "idle",
            Role::Broadcaster => "broadcaster",
            Role::Listener => "listener",
        };
        f.write_str(s)
    }
}

/// Identity of this participant within one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSession {
    pub room_id: RoomId,
    pub local_id: PeerId,
}

impl LocalSession {
    pub fn new(room_id: RoomId, local_id: PeerId) -> Self {
        Self { room_id, local_id }
    }
}

/// Snapshot published to observers on every change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionStatus {
    pub role: Role,
    pub room_id: Option<RoomId>,
    pub local_id: Option<PeerId>,
    /// Peers whose connection is currently `connected`. For a broadcaster
    /// this is the listener count.
    pub connected_peers: usize,
    pub receiving_audio: bool,
}

impl SessionStatus {
    pub fn active(role: Role, session: &LocalSession) -> Self {
        Self {
            role,
            room_id: Some(session.room_id.clone()),
            local_id: Some(session.local_id.clone()),
            connected_peers: 0,
            receiving_audio: false,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.role == Role::Idle
    }
}
