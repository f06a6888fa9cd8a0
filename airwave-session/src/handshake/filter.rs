use airwave_core::{PeerId, SignalingMessage};
use std::collections::{HashSet, VecDeque};

/// Verdict of the admission check run on every inbound row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    /// Our own insert coming back through the room subscription.
    OwnEcho,
    AddressedElsewhere,
}

pub fn admit(message: &SignalingMessage, local: &PeerId) -> Admission {
    if &message.sender_id == local {
        Admission::OwnEcho
    } else if !message.is_addressed_to(local) {
        Admission::AddressedElsewhere
    } else {
        Admission::Accept
    }
}

const DEFAULT_CAPACITY: usize = 512;

/// Bounded memory of rows already handled, so a redelivered row is a no-op.
pub struct RecentMessages {
    capacity: usize,
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl RecentMessages {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Records the row and returns true if it had not been seen yet.
    pub fn first_sighting(&mut self, message: &SignalingMessage) -> bool {
        let key = fingerprint(message);
        if self.seen.contains(&key) {
            return false;
        }

        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for RecentMessages {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn fingerprint(message: &SignalingMessage) -> String {
    format!(
        "{}|{}|{}|{}",
        message.sender_id,
        message.kind,
        message.created_at.to_rfc3339(),
        message.payload
    )
}
