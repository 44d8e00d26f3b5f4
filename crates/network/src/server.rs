use crate::{PeerId, SyncPeerClient};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::broadcast;

const PEER_EVENT_BUFFER: usize = 256;

/// Peer lifecycle notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
}

/// What the sync engine needs from the connection manager.
pub trait Network: Send + Sync {
    /// Currently connected peers.
    fn peers(&self) -> Vec<PeerId>;

    /// Stream of connect/disconnect events.
    fn subscribe_peer_events(&self) -> broadcast::Receiver<PeerEvent>;

    /// The request client for one connected peer, if still connected.
    fn client(&self, peer: PeerId) -> Option<Arc<dyn SyncPeerClient>>;

    /// Drops the peer. Best effort; the disconnect reason is logged to the
    /// remote side where the transport supports it.
    fn disconnect_from_peer(&self, peer: PeerId, reason: &str);
}

/// In-memory connection registry.
///
/// The transport registers a [`SyncPeerClient`] per authenticated stream;
/// everything downstream only ever sees this registry. Tests use it to wire
/// nodes directly to each other.
pub struct InProcessNetwork {
    peers: RwLock<HashMap<PeerId, Arc<dyn SyncPeerClient>>>,
    events: broadcast::Sender<PeerEvent>,
}

impl InProcessNetwork {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(PEER_EVENT_BUFFER);
        Arc::new(Self { peers: RwLock::new(HashMap::new()), events })
    }

    /// Registers a connected peer and announces it.
    pub fn add_peer(&self, peer: PeerId, client: Arc<dyn SyncPeerClient>) {
        self.peers.write().insert(peer, client);
        let _ = self.events.send(PeerEvent::PeerConnected(peer));
    }

    /// Removes a peer and announces the disconnect.
    pub fn remove_peer(&self, peer: PeerId) {
        if self.peers.write().remove(&peer).is_some() {
            let _ = self.events.send(PeerEvent::PeerDisconnected(peer));
        }
    }
}

impl Network for InProcessNetwork {
    fn peers(&self) -> Vec<PeerId> {
        self.peers.read().keys().copied().collect()
    }

    fn subscribe_peer_events(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }

    fn client(&self, peer: PeerId) -> Option<Arc<dyn SyncPeerClient>> {
        self.peers.read().get(&peer).cloned()
    }

    fn disconnect_from_peer(&self, peer: PeerId, reason: &str) {
        tracing::info!(target: "network", %peer, reason, "disconnecting peer");
        self.remove_peer(peer);
    }
}
