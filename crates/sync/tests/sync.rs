//! Sync-engine scenarios over in-process nodes wired directly to each
//! other's protocol service.

use dogesync_blockchain::Blockchain;
use dogesync_chainspec::{ChainSpec, Forks, Genesis, GenesisAccount, Params};
use dogesync_kvdb::MemDb;
use dogesync_network::{
    proto, InProcessNetwork, Network, PeerId, RequestResult, SyncPeerClient,
};
use dogesync_primitives::{
    crypto::{address_of, seal_header, TxSigner},
    ibft, proofs, Address, Block, Bytes, Header, Transaction, B256, EMPTY_OMMERS_HASH,
    EMPTY_ROOT_HASH, U256,
};
use dogesync_state::{Executor, TX_GAS};
use dogesync_sync::{SyncError, SyncService, Syncer};
use dogesync_trie::{KvTrieStorage, State};
use secp256k1::SecretKey;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

const CHAIN_ID: u64 = 2000;

fn proposer_key() -> SecretKey {
    SecretKey::from_slice(&[0x31u8; 32]).expect("valid key")
}

fn sender_key() -> SecretKey {
    SecretKey::from_slice(&[0x32u8; 32]).expect("valid key")
}

fn spec(extra_alloc: Option<Address>) -> ChainSpec {
    let mut alloc = BTreeMap::new();
    alloc.insert(
        address_of(&sender_key()),
        GenesisAccount { balance: U256::from(10u64).pow(U256::from(18u64)), ..Default::default() },
    );
    if let Some(address) = extra_alloc {
        alloc.insert(address, GenesisAccount { balance: U256::from(7u64), ..Default::default() });
    }

    ChainSpec {
        name: "dogesync-test".into(),
        genesis: Genesis {
            gas_limit: 8_000_000,
            difficulty: 1,
            timestamp: 1_700_000_000,
            alloc,
            ..Default::default()
        },
        params: Params { chain_id: CHAIN_ID, forks: Forks::all_at_genesis(), ..Default::default() },
        bootnodes: Vec::new(),
    }
}

/// One in-process node: chain, sync engine and protocol service.
struct Node {
    blockchain: Arc<Blockchain>,
    syncer: Arc<Syncer>,
    network: Arc<InProcessNetwork>,
    service: Arc<SyncService>,
}

fn node(spec: ChainSpec) -> Node {
    let db: Arc<dyn dogesync_kvdb::Database> = Arc::new(MemDb::new());
    let spec = Arc::new(spec);
    let state = Arc::new(State::new(Arc::new(KvTrieStorage::new(Arc::clone(&db)))));
    let executor = Arc::new(Executor::new(&spec.params, Arc::clone(&state)));
    let blockchain = Blockchain::new(spec, db, state, executor);
    blockchain.handle_genesis().expect("genesis");

    let network = InProcessNetwork::new();
    let syncer = Syncer::new(Arc::clone(&blockchain), Arc::clone(&network) as Arc<dyn Network>);
    let service =
        Arc::new(SyncService::new(Arc::clone(&blockchain), Arc::clone(&syncer)));

    Node { blockchain, syncer, network, service }
}

/// A client served directly by another node's protocol service.
struct LoopbackClient {
    service: Arc<SyncService>,
    hang_bodies: AtomicBool,
}

impl LoopbackClient {
    fn new(service: Arc<SyncService>) -> Arc<Self> {
        Arc::new(Self { service, hang_bodies: AtomicBool::new(false) })
    }
}

#[async_trait::async_trait]
impl SyncPeerClient for LoopbackClient {
    async fn get_current(&self) -> RequestResult<proto::V1Status> {
        Ok(self.service.get_current().await)
    }

    async fn get_headers(
        &self,
        request: proto::GetHeadersRequest,
    ) -> RequestResult<proto::HeadersResponse> {
        Ok(self.service.get_headers(request).await)
    }

    async fn get_blocks(&self, from: u64, to: u64) -> RequestResult<proto::BlocksResponse> {
        Ok(self.service.get_blocks(proto::GetBlocksRequest { from, to }).await)
    }

    async fn get_bodies(&self, hashes: Vec<B256>) -> RequestResult<proto::BodiesResponse> {
        if self.hang_bodies.load(Ordering::SeqCst) {
            // a peer that accepted the request and never answers
            std::future::pending::<()>().await;
        }
        Ok(self.service.get_bodies(hashes).await)
    }

    async fn notify(&self, _request: proto::NotifyRequest) -> RequestResult<()> {
        Ok(())
    }
}

/// An empty block on the current head; no execution, the state root carries
/// over.
fn empty_block(chain: &Blockchain, timestamp_salt: u64) -> Block {
    let parent = chain.header().expect("initialized");
    let header = Header {
        parent_hash: parent.hash(),
        sha3_uncles: EMPTY_OMMERS_HASH,
        number: parent.number + 1,
        gas_limit: parent.gas_limit,
        timestamp: parent.timestamp + 2 + timestamp_salt,
        state_root: parent.state_root,
        tx_root: EMPTY_ROOT_HASH,
        receipts_root: EMPTY_ROOT_HASH,
        difficulty: 1,
        ..Default::default()
    };
    Block::new(header.seal(), Vec::new())
}

/// A sealed block carrying `transactions`, with roots learned from a probe
/// execution.
fn full_block(chain: &Blockchain, transactions: Vec<Transaction>) -> Block {
    let parent = chain.header().expect("initialized");
    let proposer = address_of(&proposer_key());

    let mut header = Header {
        parent_hash: parent.hash(),
        sha3_uncles: EMPTY_OMMERS_HASH,
        number: parent.number + 1,
        gas_limit: parent.gas_limit,
        timestamp: parent.timestamp + 2,
        miner: proposer,
        difficulty: 1,
        tx_root: proofs::calculate_transactions_root(&transactions),
        ..Default::default()
    };
    header.extra_data = ibft::put_ibft_extra_validators(&Bytes::new(), &[proposer]);

    let probe = Block::new(
        seal_header(header.clone(), &proposer_key()).expect("seal").seal(),
        transactions.clone(),
    );
    let result = chain.execute_block_transactions(&probe).expect("probe execution");

    header.receipts_root = proofs::calculate_receipts_root(&result.receipts);
    header.state_root = result.root;
    header.gas_used = result.total_gas;

    Block::new(seal_header(header, &proposer_key()).expect("seal").seal(), transactions)
}

fn transfer(nonce: u64, to: Address, value: u64) -> Transaction {
    let tx = Transaction {
        nonce,
        gas_price: U256::from(1u64),
        gas: TX_GAS,
        to: Some(to),
        value: U256::from(value),
        ..Default::default()
    };
    TxSigner::new(CHAIN_ID, true).sign(tx, &sender_key()).expect("signing")
}

/// Connects `remote` as a peer of `local` and registers it with the sync
/// engine.
async fn connect(local: &Node, remote: &Node, id: PeerId) -> Arc<LoopbackClient> {
    let client = LoopbackClient::new(Arc::clone(&remote.service));
    local.network.add_peer(id, Arc::clone(&client) as Arc<dyn SyncPeerClient>);
    local.syncer.add_peer(id).await.expect("add peer");
    client
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_block_sync_from_one_peer() {
    let source = node(spec(None));
    let target = node(spec(None));

    let receiver = Address::repeat_byte(0xbb);
    let tx = transfer(0, receiver, 1);
    let block = full_block(&source.blockchain, vec![tx.clone()]);
    source.blockchain.write_block(&block).unwrap();

    let peer_id = PeerId::repeat_byte(1);
    connect(&target, &source, peer_id).await;

    let best = target.syncer.best_peer().expect("peer is ahead");
    assert_eq!(best.number(), 1);

    target.syncer.bulk_sync_with_peer(best).await.unwrap();

    let head = target.blockchain.header().unwrap();
    assert_eq!(head.number, 1);
    assert_eq!(head.hash(), block.hash());

    let receipts = target.blockchain.get_receipts_by_hash(block.hash()).unwrap();
    assert_eq!(receipts.len(), 1);
    assert!(receipts[0].success());
    assert_eq!(receipts[0].cumulative_gas_used, TX_GAS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multi_block_sync_is_ordered() {
    let source = node(spec(None));
    let target = node(spec(None));

    for salt in 0..5 {
        let block = empty_block(&source.blockchain, salt);
        source.blockchain.write_block(&block).unwrap();
    }

    let peer_id = PeerId::repeat_byte(2);
    connect(&target, &source, peer_id).await;
    let best = target.syncer.best_peer().expect("peer is ahead");

    target.syncer.bulk_sync_with_peer(best).await.unwrap();

    // the canonical chain is fully linked
    assert_eq!(target.blockchain.header().unwrap().number, 5);
    for number in 1..=5u64 {
        let header = target.blockchain.get_header_by_number(number).unwrap();
        let parent = target.blockchain.get_header_by_number(number - 1).unwrap();
        assert_eq!(header.parent_hash, parent.hash());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fork_detection_finds_ancestor_without_disconnect() {
    let local = node(spec(None));
    let peer = node(spec(None));

    // shared prefix up to height 2
    for salt in 0..2 {
        let block = empty_block(&local.blockchain, salt);
        local.blockchain.write_block(&block).unwrap();
        peer.blockchain.write_block(&block).unwrap();
    }
    // diverging block 3
    let local_tip = empty_block(&local.blockchain, 10);
    local.blockchain.write_block(&local_tip).unwrap();
    let peer_tip = empty_block(&peer.blockchain, 20);
    peer.blockchain.write_block(&peer_tip).unwrap();

    let peer_id = PeerId::repeat_byte(3);
    connect(&local, &peer, peer_id).await;

    let sync_peer = local.syncer.peer(peer_id).unwrap();
    let (ancestor, fork) = local.syncer.find_common_ancestor(&sync_peer).await.unwrap();

    assert_eq!(ancestor.number, 2);
    assert_eq!(fork.number, 3);
    assert_eq!(fork.hash(), peer_tip.hash());

    // same genesis: the peer stays connected, the local chain is unchanged
    assert_eq!(local.network.peers(), vec![peer_id]);
    assert_eq!(local.blockchain.header().unwrap().hash(), local_tip.hash());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mismatched_genesis_disconnects_peer() {
    let local = node(spec(None));
    // a different alloc yields a different genesis hash
    let peer = node(spec(Some(Address::repeat_byte(0x99))));

    let block = empty_block(&peer.blockchain, 0);
    peer.blockchain.write_block(&block).unwrap();

    let peer_id = PeerId::repeat_byte(4);
    connect(&local, &peer, peer_id).await;

    let sync_peer = local.syncer.peer(peer_id).unwrap();
    let err = local.syncer.bulk_sync_with_peer(sync_peer).await.unwrap_err();
    assert!(matches!(err, SyncError::MismatchGenesis));

    // disconnected with reason "different network"
    assert!(local.network.peers().is_empty());
    assert_eq!(local.blockchain.header().unwrap().number, 0);
}

#[tokio::test(start_paused = true)]
async fn body_fetch_timeout_aborts_the_run() {
    let source = node(spec(None));
    let target = node(spec(None));

    let block = empty_block(&source.blockchain, 0);
    source.blockchain.write_block(&block).unwrap();

    let peer_id = PeerId::repeat_byte(5);
    let client = connect(&target, &source, peer_id).await;
    client.hang_bodies.store(true, Ordering::SeqCst);

    let sync_peer = target.syncer.peer(peer_id).unwrap();
    let err = target.syncer.bulk_sync_with_peer(sync_peer).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Request(dogesync_network::RequestError::Timeout)
    ));

    // no progress was made
    assert_eq!(target.blockchain.header().unwrap().number, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn best_peer_requires_a_lead() {
    let local = node(spec(None));
    let peer = node(spec(None));

    // the peer is at the same height as us
    let peer_id = PeerId::repeat_byte(6);
    connect(&local, &peer, peer_id).await;
    assert!(local.syncer.best_peer().is_none());

    // an announced status lifts it above the local head
    local.syncer.update_peer_status(
        peer_id,
        dogesync_sync::PeerStatus {
            difficulty: U256::from(2u64),
            hash: B256::repeat_byte(1),
            number: 4,
        },
    );
    let best = local.syncer.best_peer().expect("now ahead");
    assert_eq!(best.number(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn notify_updates_status_and_enqueues_hint() {
    let local = node(spec(None));
    let peer = node(spec(None));

    let block = empty_block(&peer.blockchain, 0);
    peer.blockchain.write_block(&block).unwrap();

    let peer_id = PeerId::repeat_byte(7);
    connect(&local, &peer, peer_id).await;

    let request = proto::NotifyRequest {
        status: Some(proto::V1Status {
            number: 1,
            hash: block.hash().to_string(),
            difficulty: "2".to_string(),
        }),
        raw: alloy_rlp::encode(&block),
    };
    local.service.notify(peer_id, request).await.unwrap();

    let sync_peer = local.syncer.peer(peer_id).unwrap();
    assert_eq!(sync_peer.number(), 1);
    let (number, hash) =
        sync_peer.pop_block_hint(std::time::Duration::from_secs(1)).await.unwrap();
    assert_eq!((number, hash), (1, block.hash()));
}
