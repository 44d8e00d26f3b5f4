use crate::{skeleton::MAX_SKELETON_HEADERS_AMOUNT, PeerStatus, SyncError, Syncer};
use alloy_rlp::Decodable;
use dogesync_blockchain::Blockchain;
use dogesync_network::{proto, PeerId};
use dogesync_primitives::{Block, B256};
use std::{str::FromStr, sync::Arc};
use tracing::debug;

/// The server half of the `V1` protocol: answers peer requests out of the
/// local chain and takes notify intake. The transport dispatches its
/// deframed requests here.
pub struct SyncService {
    blockchain: Arc<Blockchain>,
    syncer: Arc<Syncer>,
}

impl SyncService {
    pub fn new(blockchain: Arc<Blockchain>, syncer: Arc<Syncer>) -> Self {
        Self { blockchain, syncer }
    }

    /// The local chain tip.
    pub async fn get_current(&self) -> proto::V1Status {
        match self.blockchain.header() {
            Some(header) => proto::V1Status {
                number: header.number,
                hash: header.hash().to_string(),
                difficulty: self.blockchain.current_td().to_string(),
            },
            None => self.syncer.status().to_proto(),
        }
    }

    /// Headers by hash, or a `skip`-strided run starting at `number`. The
    /// response is bounded by the skeleton batch ceiling.
    pub async fn get_headers(&self, request: proto::GetHeadersRequest) -> proto::HeadersResponse {
        if !request.hash.is_empty() {
            let objs = B256::from_str(request.hash.trim_start_matches("0x"))
                .ok()
                .and_then(|hash| self.blockchain.get_header_by_hash(hash))
                .map(|header| vec![alloy_rlp::encode(header.header())])
                .unwrap_or_default();
            return proto::HeadersResponse { objs };
        }

        let amount = request.amount.clamp(1, MAX_SKELETON_HEADERS_AMOUNT) as u64;
        let step = request.skip.max(0) as u64 + 1;
        let mut number = request.number.max(0) as u64;

        let mut objs = Vec::with_capacity(amount as usize);
        for _ in 0..amount {
            let Some(header) = self.blockchain.get_header_by_number(number) else { break };
            objs.push(alloy_rlp::encode(header.header()));

            let Some(next) = number.checked_add(step) else { break };
            number = next;
        }

        proto::HeadersResponse { objs }
    }

    /// Whole blocks in `[from, to]`, RLP-encoded.
    pub async fn get_blocks(&self, request: proto::GetBlocksRequest) -> proto::BlocksResponse {
        let to = request
            .to
            .min(request.from.saturating_add(MAX_SKELETON_HEADERS_AMOUNT as u64));

        let mut blocks = Vec::new();
        for number in request.from..=to {
            match self.blockchain.get_block_by_number(number) {
                Ok(Some(block)) => blocks.push(alloy_rlp::encode(&block)),
                _ => break,
            }
        }

        proto::BlocksResponse { blocks }
    }

    /// Bodies for the requested header hashes. A hash this node cannot
    /// resolve truncates the response; the requester rejects the batch.
    pub async fn get_bodies(&self, hashes: Vec<B256>) -> proto::BodiesResponse {
        let mut bodies = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let Some(header) = self.blockchain.get_header_by_hash(hash) else { break };

            if !header.has_body() {
                bodies.push(proto::BodyMessage { transactions: Vec::new() });
                continue;
            }

            match self.blockchain.get_body_by_hash(hash) {
                Ok(Some(body)) => bodies.push(proto::BodyMessage {
                    transactions: body.transactions.iter().map(alloy_rlp::encode).collect(),
                }),
                _ => break,
            }
        }

        proto::BodiesResponse { bodies }
    }

    /// Notify intake: updates the peer's status and records the announced
    /// block as a hint. Blocks themselves are always re-fetched through the
    /// pipeline.
    pub async fn notify(
        &self,
        peer: PeerId,
        request: proto::NotifyRequest,
    ) -> Result<(), SyncError> {
        if let Some(status) = &request.status {
            self.syncer.update_peer_status(peer, PeerStatus::from_proto(status)?);
        }

        if !request.raw.is_empty() {
            let block = Block::decode(&mut request.raw.as_slice())?;
            debug!(target: "sync", %peer, number = block.number(), "block announced");
            self.syncer.enqueue_block(peer, block.number(), block.hash());
        }

        Ok(())
    }
}
