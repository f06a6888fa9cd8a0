use crate::peer::Peer;
use airwave_core::PeerId;
use dashmap::DashMap;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Peers of the current session keyed by remote id.
///
/// Mutations happen on the handshake loop only; the session manager reads
/// counts concurrently.
#[derive(Default)]
pub struct PeerRegistry {
    peers: DashMap<PeerId, Arc<Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing peer for `id`, or registers the one `create` builds.
    pub async fn upsert<F, Fut, E>(&self, id: PeerId, create: F) -> Result<Arc<Peer>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Peer, E>>,
    {
        if let Some(existing) = self.get(&id) {
            return Ok(existing);
        }
        let peer = Arc::new(create().await?);
        self.peers.insert(id, Arc::clone(&peer));
        Ok(peer)
    }

    pub fn get(&self, id: &PeerId) -> Option<Arc<Peer>> {
        self.peers.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Like `get`, but only if the registered connection is `epoch`.
    pub fn get_current(&self, id: &PeerId, epoch: u64) -> Option<Arc<Peer>> {
        self.get(id).filter(|peer| peer.epoch() == epoch)
    }

    /// Removes and closes the peer. Returns false if it was not registered.
    pub async fn remove(&self, id: &PeerId) -> bool {
        let Some((_, peer)) = self.peers.remove(id) else {
            return false;
        };
        peer.close().await;
        debug!(peer = %id, epoch = peer.epoch(), "Peer removed");
        true
    }

    /// Removes the peer only if it is still the `epoch` connection.
    pub async fn remove_current(&self, id: &PeerId, epoch: u64) -> bool {
        let Some((_, peer)) = self.peers.remove_if(id, |_, peer| peer.epoch() == epoch) else {
            return false;
        };
        peer.close().await;
        debug!(peer = %id, epoch, "Peer evicted");
        true
    }

    /// Closes every connection and empties the registry.
    pub async fn remove_all(&self) -> usize {
        let ids: Vec<PeerId> = self.peers.iter().map(|entry| entry.key().clone()).collect();
        let removed: Vec<Arc<Peer>> = ids
            .iter()
            .filter_map(|id| self.peers.remove(id).map(|(_, peer)| peer))
            .collect();

        join_all(removed.iter().map(|peer| peer.close())).await;
        removed.len()
    }

    pub fn count_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&Peer) -> bool,
    {
        self.peers
            .iter()
            .filter(|entry| predicate(entry.value()))
            .count()
    }

    pub fn connected_count(&self) -> usize {
        self.count_where(Peer::is_connected)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
