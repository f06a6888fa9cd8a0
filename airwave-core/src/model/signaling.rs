use crate::model::peer::PeerId;
use crate::model::room::RoomId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Value of the `type` column. Unknown strings survive a round trip so that
/// rows written by newer clients can be recognised and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SignalKind {
    JoinRequest,
    Offer,
    Answer,
    IceCandidate,
    Other(String),
}

impl SignalKind {
    pub fn as_str(&self) -> &str {
        match self {
            SignalKind::JoinRequest => "join-request",
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
            SignalKind::Other(s) => s,
        }
    }
}

impl From<String> for SignalKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "join-request" => SignalKind::JoinRequest,
            "offer" => SignalKind::Offer,
            "answer" => SignalKind::Answer,
            "ice-candidate" => SignalKind::IceCandidate,
            _ => SignalKind::Other(s),
        }
    }
}

impl From<&str> for SignalKind {
    fn from(s: &str) -> Self {
        SignalKind::from(s.to_owned())
    }
}

impl From<SignalKind> for String {
    fn from(kind: SignalKind) -> Self {
        match kind {
            SignalKind::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `join-request`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestPayload {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub user_id: PeerId,
}

/// Payload of an `offer` or `answer`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SdpPayload {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub sdp: String,
}

/// Browser-compatible `RTCIceCandidateInit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IceCandidatePayload {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_m_line_index: Option<u16>,
    #[serde(rename = "usernameFragment", default)]
    pub username_fragment: Option<String>,
}

impl IceCandidatePayload {
    /// An empty candidate string marks end-of-candidates and carries no path.
    pub fn is_empty(&self) -> bool {
        self.candidate.trim().is_empty()
    }
}

/// Payload of an `ice-candidate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidatePayload {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    #[serde(default)]
    pub candidate: Option<IceCandidatePayload>,
}

/// A row of the signaling table as observed by subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingMessage {
    pub room_id: RoomId,
    pub sender_id: PeerId,
    #[serde(default)]
    pub receiver_id: Option<PeerId>,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    #[serde(default)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl SignalingMessage {
    pub fn sdp(&self) -> Result<SdpPayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn candidate(&self) -> Result<Option<IceCandidatePayload>, serde_json::Error> {
        let payload: CandidatePayload = serde_json::from_value(self.payload.clone())?;
        Ok(payload.candidate.filter(|c| !c.is_empty()))
    }

    /// True when the row is addressed to everyone or to `local`.
    pub fn is_addressed_to(&self, local: &PeerId) -> bool {
        self.receiver_id.as_ref().is_none_or(|r| r == local)
    }
}

/// A row about to be inserted. `created_at` is assigned by the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSignal {
    pub room_id: RoomId,
    pub sender_id: PeerId,
    pub receiver_id: Option<PeerId>,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub payload: Value,
}

impl NewSignal {
    pub fn join_request(room_id: RoomId, sender_id: PeerId) -> Self {
        let payload = JoinRequestPayload {
            kind: SignalKind::JoinRequest,
            user_id: sender_id.clone(),
        };
        Self {
            room_id,
            sender_id,
            receiver_id: None,
            kind: SignalKind::JoinRequest,
            payload: to_value(&payload),
        }
    }

    pub fn offer(room_id: RoomId, sender_id: PeerId, receiver_id: PeerId, sdp: String) -> Self {
        Self::sdp(room_id, sender_id, receiver_id, SignalKind::Offer, sdp)
    }

    pub fn answer(room_id: RoomId, sender_id: PeerId, receiver_id: PeerId, sdp: String) -> Self {
        Self::sdp(room_id, sender_id, receiver_id, SignalKind::Answer, sdp)
    }

    pub fn ice_candidate(
        room_id: RoomId,
        sender_id: PeerId,
        receiver_id: PeerId,
        candidate: IceCandidatePayload,
    ) -> Self {
        let payload = CandidatePayload {
            kind: SignalKind::IceCandidate,
            candidate: Some(candidate),
        };
        Self {
            room_id,
            sender_id,
            receiver_id: Some(receiver_id),
            kind: SignalKind::IceCandidate,
            payload: to_value(&payload),
        }
    }

    fn sdp(
        room_id: RoomId,
        sender_id: PeerId,
        receiver_id: PeerId,
        kind: SignalKind,
        sdp: String,
    ) -> Self {
        let payload = SdpPayload {
            kind: kind.clone(),
            sdp,
        };
        Self {
            room_id,
            sender_id,
            receiver_id: Some(receiver_id),
            kind,
            payload: to_value(&payload),
        }
    }

    /// Materialise the row the way a bus does on insert.
    pub fn into_message(self, created_at: DateTime<Utc>) -> SignalingMessage {
        SignalingMessage {
            room_id: self.room_id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            kind: self.kind,
            payload: self.payload,
            created_at,
        }
    }
}

// Payload structs only hold strings and options, serialization cannot fail.
fn to_value<T: Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}
