use crate::SyncError;
use dogesync_network::{proto, PeerId, SyncPeerClient};
use dogesync_primitives::{BlockNumber, B256, U256};
use parking_lot::{Mutex, RwLock};
use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use tokio::sync::Notify;

/// Ceiling of per-peer announced block hints.
const MAX_ENQUEUE_SIZE: usize = 50;

/// How long a consumer waits for an announced block before giving up.
pub(crate) const POP_TIMEOUT: Duration = Duration::from_secs(10);

/// Up-to-date information about one peer's chain tip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerStatus {
    pub difficulty: U256,
    pub hash: B256,
    pub number: BlockNumber,
}

impl PeerStatus {
    pub fn from_proto(status: &proto::V1Status) -> Result<Self, SyncError> {
        let difficulty =
            U256::from_str(&status.difficulty).map_err(|_| SyncError::DecodeDifficulty)?;
        let hash = B256::from_str(status.hash.trim_start_matches("0x"))
            .map_err(|_| SyncError::DecodeDifficulty)?;

        Ok(Self { difficulty, hash, number: status.number })
    }

    pub fn to_proto(&self) -> proto::V1Status {
        proto::V1Status {
            number: self.number,
            hash: self.hash.to_string(),
            difficulty: self.difficulty.to_string(),
        }
    }
}

/// A connected peer: its request client, latest advertised status and the
/// min-heap of announced block hints.
///
/// The status is advisory; broadcasts arrive out of order, so sync progress
/// never relies on it step by step.
pub struct SyncPeer {
    pub(crate) peer: PeerId,
    pub(crate) client: Arc<dyn SyncPeerClient>,

    status: RwLock<PeerStatus>,
    enqueued: Mutex<BinaryHeap<Reverse<(BlockNumber, B256)>>>,
    enqueued_notify: Notify,
}

impl SyncPeer {
    pub fn new(peer: PeerId, client: Arc<dyn SyncPeerClient>, status: PeerStatus) -> Self {
        Self {
            peer,
            client,
            status: RwLock::new(status),
            enqueued: Mutex::new(BinaryHeap::new()),
            enqueued_notify: Notify::new(),
        }
    }

    pub fn id(&self) -> PeerId {
        self.peer
    }

    /// The latest advertised block height.
    pub fn number(&self) -> BlockNumber {
        self.status.read().number
    }

    pub fn status(&self) -> PeerStatus {
        self.status.read().clone()
    }

    /// Monotonic update: a status only replaces the current one when it is
    /// higher, or equal-height with a differing hash.
    pub fn update_status(&self, status: PeerStatus) {
        let mut current = self.status.write();
        if status.number < current.number {
            return;
        }
        if status.number == current.number && status.hash == current.hash {
            return;
        }
        *current = status;
    }

    /// Records an announced block as a hint that the peer advanced. The
    /// actual block is always re-fetched through the normal pipeline.
    pub fn append_block_hint(&self, number: BlockNumber, hash: B256) {
        let mut enqueued = self.enqueued.lock();
        if enqueued.len() >= MAX_ENQUEUE_SIZE {
            return;
        }
        enqueued.push(Reverse((number, hash)));
        drop(enqueued);

        self.enqueued_notify.notify_one();
    }

    /// Pops the lowest announced block, waiting up to `timeout`.
    pub async fn pop_block_hint(
        &self,
        timeout: Duration,
    ) -> Result<(BlockNumber, B256), SyncError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(Reverse(hint)) = self.enqueued.lock().pop() {
                return Ok(hint);
            }

            if tokio::time::timeout_at(deadline, self.enqueued_notify.notified()).await.is_err() {
                return Err(SyncError::PopTimeout);
            }
        }
    }

    /// Drops hints at or below an already written block number.
    pub fn prune_enqueued(&self, number: BlockNumber) -> usize {
        let mut enqueued = self.enqueued.lock();
        let before = enqueued.len();
        enqueued.retain(|Reverse((n, _))| *n > number);
        before - enqueued.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogesync_network::RequestResult;

    struct NoopClient;

    #[async_trait::async_trait]
    impl SyncPeerClient for NoopClient {
        async fn get_current(&self) -> RequestResult<proto::V1Status> {
            unimplemented!("not used")
        }
        async fn get_headers(
            &self,
            _request: proto::GetHeadersRequest,
        ) -> RequestResult<proto::HeadersResponse> {
            unimplemented!("not used")
        }
        async fn get_blocks(&self, _from: u64, _to: u64) -> RequestResult<proto::BlocksResponse> {
            unimplemented!("not used")
        }
        async fn get_bodies(&self, _hashes: Vec<B256>) -> RequestResult<proto::BodiesResponse> {
            unimplemented!("not used")
        }
        async fn notify(&self, _request: proto::NotifyRequest) -> RequestResult<()> {
            unimplemented!("not used")
        }
    }

    fn peer() -> SyncPeer {
        SyncPeer::new(
            PeerId::repeat_byte(1),
            Arc::new(NoopClient),
            PeerStatus { difficulty: U256::from(1u64), hash: B256::ZERO, number: 0 },
        )
    }

    #[test]
    fn status_updates_are_monotonic() {
        let peer = peer();

        peer.update_status(PeerStatus {
            difficulty: U256::from(2u64),
            hash: B256::repeat_byte(1),
            number: 5,
        });
        assert_eq!(peer.number(), 5);

        // lower statuses are ignored
        peer.update_status(PeerStatus {
            difficulty: U256::from(9u64),
            hash: B256::repeat_byte(2),
            number: 3,
        });
        assert_eq!(peer.number(), 5);

        // same height with a different hash replaces
        peer.update_status(PeerStatus {
            difficulty: U256::from(3u64),
            hash: B256::repeat_byte(3),
            number: 5,
        });
        assert_eq!(peer.status().hash, B256::repeat_byte(3));
    }

    #[tokio::test(start_paused = true)]
    async fn hints_pop_lowest_first_and_time_out() {
        let peer = peer();
        peer.append_block_hint(7, B256::repeat_byte(7));
        peer.append_block_hint(3, B256::repeat_byte(3));

        assert_eq!(peer.pop_block_hint(POP_TIMEOUT).await.unwrap().0, 3);
        assert_eq!(peer.pop_block_hint(POP_TIMEOUT).await.unwrap().0, 7);

        let err = peer.pop_block_hint(POP_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, SyncError::PopTimeout));
    }

    #[test]
    fn pruning_drops_written_hints() {
        let peer = peer();
        for n in 1..=5u64 {
            peer.append_block_hint(n, B256::with_last_byte(n as u8));
        }
        assert_eq!(peer.prune_enqueued(3), 3);
        assert_eq!(peer.prune_enqueued(3), 0);
    }
}
