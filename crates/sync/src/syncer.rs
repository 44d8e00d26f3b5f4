use crate::{
    peer::{PeerStatus, SyncPeer, POP_TIMEOUT},
    skeleton::{get_header, Skeleton, MAX_SKELETON_HEADERS_AMOUNT},
    SyncError,
};
use dogesync_blockchain::{Blockchain, EventType};
use dogesync_network::{proto, Network, PeerEvent, PeerId};
use dogesync_primitives::{Block, BlockNumber, SealedHeader, B256, U256};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity of each pipeline channel.
const BLOCK_CHANNEL_SIZE: usize = 81_920;

/// How long the fetcher sleeps when a pipeline channel runs past half full.
const BACKPRESSURE_SLEEP: Duration = Duration::from_secs(30);

/// The sync engine: watches peers, picks the best one and drives the
/// fetch → verify → write pipeline into the blockchain.
pub struct Syncer {
    blockchain: Arc<Blockchain>,
    network: Arc<dyn Network>,

    peers: RwLock<HashMap<PeerId, Arc<SyncPeer>>>,
    status: Mutex<PeerStatus>,
    stopped: AtomicBool,
}

impl Syncer {
    pub fn new(blockchain: Arc<Blockchain>, network: Arc<dyn Network>) -> Arc<Self> {
        let status = match blockchain.header() {
            Some(header) => PeerStatus {
                difficulty: U256::from(blockchain.current_td()),
                hash: header.hash(),
                number: header.number,
            },
            None => PeerStatus {
                difficulty: U256::ZERO,
                hash: Default::default(),
                number: 0,
            },
        };

        Arc::new(Self {
            blockchain,
            network,
            peers: RwLock::new(HashMap::new()),
            status: Mutex::new(status),
            stopped: AtomicBool::new(false),
        })
    }

    /// Starts the background loops and registers already-connected peers.
    pub async fn start(self: &Arc<Self>) {
        self.spawn_status_watcher();
        self.setup_peers().await;
        self.spawn_peer_event_loop();
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// The status the node advertises to peers.
    pub fn status(&self) -> PeerStatus {
        self.status.lock().clone()
    }

    // peer registry

    /// Adds every currently connected peer.
    async fn setup_peers(self: &Arc<Self>) {
        for peer in self.network.peers() {
            if let Err(err) = self.add_peer(peer).await {
                error!(target: "sync", %peer, %err, "error when adding peer");
            }
        }
    }

    /// Registers a peer and seeds its status with a `GetCurrent` round.
    pub async fn add_peer(&self, peer: PeerId) -> Result<(), SyncError> {
        if self.peers.read().contains_key(&peer) {
            return Ok(());
        }

        let client =
            self.network.client(peer).ok_or(SyncError::ConnectionClosed)?;
        let raw_status = client.get_current().await?;
        let status = PeerStatus::from_proto(&raw_status)?;

        debug!(target: "sync", %peer, number = status.number, "peer added");
        self.peers
            .write()
            .insert(peer, Arc::new(SyncPeer::new(peer, client, status)));
        Ok(())
    }

    pub fn delete_peer(&self, peer: PeerId) {
        if self.peers.write().remove(&peer).is_some() {
            debug!(target: "sync", %peer, "peer removed");
        }
    }

    pub fn peer(&self, id: PeerId) -> Option<Arc<SyncPeer>> {
        self.peers.read().get(&id).cloned()
    }

    /// Updates a peer's advertised status (monotonic per peer).
    pub fn update_peer_status(&self, peer: PeerId, status: PeerStatus) {
        debug!(
            target: "sync",
            %peer,
            number = status.number,
            hash = %status.hash,
            "update peer status"
        );
        if let Some(sync_peer) = self.peer(peer) {
            sync_peer.update_status(status);
        }
    }

    /// Records an announced block hint on its peer.
    pub fn enqueue_block(&self, peer: PeerId, number: BlockNumber, hash: B256) {
        match self.peer(peer) {
            Some(sync_peer) => sync_peer.append_block_hint(number, hash),
            None => error!(target: "sync", %peer, "enqueue block: peer not present"),
        }
    }

    /// The peer advertising the greatest block number, if any peer is ahead
    /// of the local head. Ties are not broken.
    pub fn best_peer(&self) -> Option<Arc<SyncPeer>> {
        let best = self
            .peers
            .read()
            .values()
            .max_by_key(|peer| peer.number())
            .cloned()?;

        let local_head = self.blockchain.header().map(|h| h.number).unwrap_or(0);
        (best.number() > local_head).then_some(best)
    }

    // background loops

    fn spawn_peer_event_loop(self: &Arc<Self>) {
        let syncer = Arc::clone(self);
        let mut events = self.network.subscribe_peer_events();

        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if syncer.is_stopped() {
                    return;
                }
                match event {
                    PeerEvent::PeerConnected(peer) => {
                        if let Err(err) = syncer.add_peer(peer).await {
                            error!(target: "sync", %peer, %err, "failed to add peer");
                        }
                    }
                    PeerEvent::PeerDisconnected(peer) => syncer.delete_peer(peer),
                }
            }
        });
    }

    /// Follows the blockchain event stream and keeps the advertised status
    /// at the head; fork events are not advertised.
    fn spawn_status_watcher(self: &Arc<Self>) {
        let syncer = Arc::clone(self);
        let mut events = self.blockchain.subscribe_events();

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                };
                if syncer.is_stopped() {
                    return;
                }

                if event.event_type == EventType::Fork {
                    continue;
                }
                let Some(header) = event.new_chain.first() else { continue };

                let status = PeerStatus {
                    difficulty: U256::from(event.difficulty),
                    hash: header.hash(),
                    number: header.number,
                };

                let mut current = syncer.status.lock();
                if status.number > current.number ||
                    (status.number == current.number && status.hash != current.hash)
                {
                    *current = status;
                }
            }
        });
    }

    // common-ancestor search

    /// Binary search for the highest block both chains agree on; also
    /// returns the peer's next ("fork") header for reference.
    pub async fn find_common_ancestor(
        &self,
        peer: &SyncPeer,
    ) -> Result<(SealedHeader, SealedHeader), SyncError> {
        let local_head = self.blockchain.header().ok_or(SyncError::LoadLocalGenesisFailed)?;

        let mut min = 0u64;
        let mut max = local_head.number.min(peer.number());
        let mut ancestor: Option<SealedHeader> = None;

        while min <= max {
            let m = (min + max) / 2;

            if m == 0 {
                // candidate shrunk to the genesis; compare it directly
                let local_genesis = self
                    .blockchain
                    .get_header_by_number(0)
                    .ok_or(SyncError::LoadLocalGenesisFailed)?;
                let remote_genesis = get_header(peer.client.as_ref(), 0)
                    .await?
                    .ok_or(SyncError::CommonAncestorNotFound)?;

                if remote_genesis.hash() != local_genesis.hash() {
                    return Err(SyncError::MismatchGenesis);
                }
                ancestor = Some(local_genesis);
                break;
            }

            match get_header(peer.client.as_ref(), m).await? {
                // the peer lacks this number, search below
                None => max = m - 1,
                Some(found) => {
                    let local = self
                        .blockchain
                        .get_header_by_number(m)
                        .ok_or(SyncError::CommonAncestorNotFound)?;
                    if local.hash() == found.hash() {
                        ancestor = Some(found);
                        min = m + 1;
                    } else {
                        max = m - 1;
                    }
                }
            }
        }

        let ancestor = ancestor.ok_or(SyncError::CommonAncestorNotFound)?;

        let fork = get_header(peer.client.as_ref(), ancestor.number + 1)
            .await?
            .ok_or(SyncError::ForkNotFound)?;

        Ok((ancestor, fork))
    }

    // bulk sync

    /// Syncs missing blocks from `peer` up to its advertised head through
    /// the three-stage pipeline. Returns the error that stopped the run;
    /// "different network" classes of errors disconnect the peer first.
    pub async fn bulk_sync_with_peer(self: &Arc<Self>, peer: Arc<SyncPeer>) -> Result<(), SyncError> {
        let (ancestor, fork) = match self.find_common_ancestor(&peer).await {
            Ok(found) => found,
            Err(err) => {
                if err.is_different_network() {
                    self.network.disconnect_from_peer(peer.id(), "Different network");
                }
                return Err(err);
            }
        };

        info!(
            target: "sync",
            ancestor = ancestor.number,
            fork = fork.number,
            target = peer.number(),
            "fork found"
        );

        let mut current_height = ancestor.number + 1;
        let mut last_target = 0u64;
        let mut amount = MAX_SKELETON_HEADERS_AMOUNT;

        loop {
            // re-read the target each round: the peer may have advanced while
            // this node was writing
            let target = peer.number();
            if target == last_target {
                break;
            }

            let (height, next_amount) =
                self.run_pipeline(&peer, current_height, target, amount).await?;
            current_height = height;
            amount = next_amount;
            last_target = target;
        }

        info!(target: "sync", height = current_height, "exit bulk sync with peer");
        Ok(())
    }

    /// One pipeline round: fetcher → verifier → writer over two bounded
    /// channels. Returns the next height to fetch and the adapted skeleton
    /// amount.
    async fn run_pipeline(
        self: &Arc<Self>,
        peer: &Arc<SyncPeer>,
        from: BlockNumber,
        target: BlockNumber,
        start_amount: i64,
    ) -> Result<(BlockNumber, i64), SyncError> {
        let (verified_tx, mut verified_rx) = mpsc::channel::<Block>(BLOCK_CHANNEL_SIZE);
        let (writable_tx, mut writable_rx) = mpsc::channel::<Block>(BLOCK_CHANNEL_SIZE);

        // fetcher: skeleton batches, halving on message-size rejections
        let fetcher = {
            let client = Arc::clone(&peer.client);
            let writable_probe = writable_tx.clone();
            tokio::spawn(async move {
                let mut amount = start_amount;
                let mut height = from;

                while height <= target {
                    let skeleton = Skeleton::new(amount);
                    let blocks = match skeleton.get_blocks_from_peer(client.as_ref(), height).await
                    {
                        Ok(blocks) => blocks,
                        Err(SyncError::Request(err)) if err.is_resource_exhausted() => {
                            // the batch blew the peer's message size limit
                            amount = (amount / 2).max(1);
                            continue;
                        }
                        Err(err) => return Err(err),
                    };

                    if blocks.is_empty() {
                        break;
                    }
                    amount = (amount + 1).min(MAX_SKELETON_HEADERS_AMOUNT);

                    for block in blocks {
                        height = block.number() + 1;
                        verified_tx
                            .send(block)
                            .await
                            .map_err(|_| SyncError::ConnectionClosed)?;
                    }

                    if channel_past_half(&verified_tx) || channel_past_half(&writable_probe) {
                        tokio::time::sleep(BACKPRESSURE_SLEEP).await;
                    }
                }

                Ok((height, amount))
            })
        };

        // verifier: consensus pre-checks; a failing block means a Byzantine
        // peer on another network
        let verifier = {
            let blockchain = Arc::clone(&self.blockchain);
            let network = Arc::clone(&self.network);
            let peer_id = peer.id();
            tokio::spawn(async move {
                while let Some(block) = verified_rx.recv().await {
                    if let Err(err) = blockchain.verify_finalized_block(&block) {
                        error!(target: "sync", %err, number = block.number(), "verify block");
                        network
                            .disconnect_from_peer(peer_id, "Different network due to hard fork");
                        return Err(SyncError::Chain(err));
                    }
                    if writable_tx.send(block).await.is_err() {
                        return Err(SyncError::ConnectionClosed);
                    }
                }
                Ok(())
            })
        };

        // writer: the only task that mutates the blockchain
        let mut write_result: Result<(), SyncError> = Ok(());
        while let Some(block) = writable_rx.recv().await {
            if self.is_stopped() {
                break;
            }

            let number = block.number();
            if let Err(err) = self.blockchain.write_block(&block) {
                error!(target: "sync", %err, number, "write block");
                write_result = Err(SyncError::Chain(err));
                break;
            }
            self.prune_peer_enqueued_blocks(number);
        }
        drop(writable_rx);

        let fetched = fetcher.await.map_err(|_| SyncError::ConnectionClosed)?;
        let verified = verifier.await.map_err(|_| SyncError::ConnectionClosed)?;

        // a write failure is the root cause; channel teardown errors in the
        // other stages are only its echo
        write_result?;
        verified?;
        fetched
    }

    /// After bulk sync, keeps following a peer's announced blocks: every
    /// hint triggers a re-fetch through the normal skeleton path.
    pub async fn watch_sync_with_peer(self: &Arc<Self>, peer: Arc<SyncPeer>) -> Result<(), SyncError> {
        loop {
            if self.is_stopped() {
                return Ok(());
            }

            let (number, _) = match peer.pop_block_hint(POP_TIMEOUT).await {
                Ok(hint) => hint,
                Err(SyncError::PopTimeout) => {
                    warn!(target: "sync", peer = %peer.id(), "no announced block within the timeout");
                    return Err(SyncError::PopTimeout);
                }
                Err(err) => return Err(err),
            };

            let local_head = self.blockchain.header().map(|h| h.number).unwrap_or(0);
            if number <= local_head {
                continue;
            }

            let skeleton = Skeleton::new(1);
            let blocks =
                skeleton.get_blocks_from_peer(peer.client.as_ref(), local_head + 1).await?;
            for block in blocks {
                self.blockchain.verify_finalized_block(&block)?;
                self.blockchain.write_block(&block)?;
                self.prune_peer_enqueued_blocks(block.number());
            }
        }
    }

    fn prune_peer_enqueued_blocks(&self, number: BlockNumber) {
        for (id, peer) in self.peers.read().iter() {
            let pruned = peer.prune_enqueued(number);
            if pruned > 0 {
                debug!(target: "sync", peer = %id, pruned, number, "pruned peer enqueued blocks");
            }
        }
    }

    // broadcast

    /// Pushes a freshly written block to every peer concurrently;
    /// best-effort, failures are logged and ignored.
    pub async fn broadcast(&self, block: &Block) {
        let Some(td) = self.blockchain.get_td(block.hash()) else {
            error!(target: "sync", number = block.number(), "total difficulty not found");
            return;
        };

        let request = proto::NotifyRequest {
            status: Some(proto::V1Status {
                number: block.number(),
                hash: block.hash().to_string(),
                difficulty: td.to_string(),
            }),
            raw: alloy_rlp::encode(block),
        };

        let peers: Vec<Arc<SyncPeer>> = self.peers.read().values().cloned().collect();
        for peer in peers {
            let request = request.clone();
            tokio::spawn(async move {
                if let Err(err) = peer.client.notify(request).await {
                    error!(target: "sync", peer = %peer.id(), %err, "failed to notify");
                }
            });
        }
    }
}

fn channel_past_half(sender: &mpsc::Sender<Block>) -> bool {
    let max = sender.max_capacity();
    max - sender.capacity() > max / 2
}
