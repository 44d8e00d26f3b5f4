use crate::{
    events::EventStream,
    ChainError, Event, EventType, Subscription,
};
use dogesync_chainspec::ChainSpec;
use dogesync_contracts::validatorset;
use dogesync_kvdb::Database;
use dogesync_primitives::{
    crypto::{self, TxSigner},
    proofs, Block, BlockNumber, Body, Receipt, SealedHeader, Transaction, B256, U256,
};
use dogesync_rawdb as rawdb;
use dogesync_state::{Executor, GetHashByNumber};
use dogesync_trie::State;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{error, info};

/// The bound divisor of the gas limit, used in update calculations.
const BLOCK_GAS_TARGET_DIVISOR: u64 = 1024;

const CHAIN_CACHE_SIZE: usize = 32;

/// Result of re-executing a block's body.
#[derive(Clone, Debug)]
pub struct BlockResult {
    pub root: B256,
    pub receipts: Vec<Receipt>,
    pub total_gas: u64,
}

/// Rolling average gas price over non-empty blocks.
struct GasPriceAverage {
    price: U256,
    count: U256,
}

/// Owns the canonical chain. The sync engine drives it; everything here is
/// passive.
pub struct Blockchain {
    spec: Arc<ChainSpec>,
    db: Arc<dyn Database>,
    #[allow(dead_code)]
    state: Arc<State>,
    executor: Arc<Executor>,

    genesis: RwLock<B256>,
    stream: EventStream,

    current_header: RwLock<Option<SealedHeader>>,
    current_difficulty: AtomicU64,
    stopped: AtomicBool,

    headers_cache: Mutex<LruCache<B256, SealedHeader>>,
    canonical_cache: Mutex<LruCache<BlockNumber, B256>>,
    difficulty_cache: Mutex<LruCache<B256, u64>>,

    gp_average: Mutex<GasPriceAverage>,
}

impl Blockchain {
    pub fn new(
        spec: Arc<ChainSpec>,
        db: Arc<dyn Database>,
        state: Arc<State>,
        executor: Arc<Executor>,
    ) -> Arc<Self> {
        let chain = Arc::new(Self {
            spec,
            db,
            state,
            executor,
            genesis: RwLock::new(B256::ZERO),
            stream: EventStream::new(),
            current_header: RwLock::new(None),
            current_difficulty: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            headers_cache: Mutex::new(LruCache::new(nonzero(CHAIN_CACHE_SIZE))),
            canonical_cache: Mutex::new(LruCache::new(nonzero(CHAIN_CACHE_SIZE))),
            difficulty_cache: Mutex::new(LruCache::new(nonzero(CHAIN_CACHE_SIZE))),
            gp_average: Mutex::new(GasPriceAverage { price: U256::ZERO, count: U256::ZERO }),
        });

        // wire the BLOCKHASH ancestor walk into the executor
        let walker_db = Arc::clone(&chain.db);
        chain.executor.set_get_hash(Box::new(move |header| {
            let db = Arc::clone(&walker_db);
            let (number, hash) = (header.number.saturating_sub(1), header.parent_hash);
            Arc::new(move |wanted| {
                let (mut num, mut cursor) = (number, hash);
                loop {
                    if num == wanted {
                        return cursor;
                    }
                    let Some(header) = rawdb::read_header(db.as_ref(), cursor).ok().flatten()
                    else {
                        return B256::ZERO;
                    };
                    cursor = header.parent_hash;
                    if num == 0 {
                        return B256::ZERO;
                    }
                    num -= 1;
                }
            }) as GetHashByNumber
        }));

        chain
    }

    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    pub fn close(&self) -> Result<(), ChainError> {
        self.executor.stop();
        self.stopped.store(true, Ordering::SeqCst);
        self.db.close().map_err(|err| ChainError::RawDb(err.into()))
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    // head state

    /// The current head header, if the chain is initialized.
    pub fn header(&self) -> Option<SealedHeader> {
        self.current_header.read().clone()
    }

    /// The total difficulty at the current head.
    pub fn current_td(&self) -> u64 {
        self.current_difficulty.load(Ordering::SeqCst)
    }

    pub fn genesis_hash(&self) -> B256 {
        *self.genesis.read()
    }

    fn set_current_header(&self, header: SealedHeader, td: u64) {
        *self.current_header.write() = Some(header);
        self.current_difficulty.store(td, Ordering::SeqCst);
    }

    // lookups

    pub fn get_header_by_hash(&self, hash: B256) -> Option<SealedHeader> {
        if let Some(header) = self.headers_cache.lock().get(&hash) {
            return Some(header.clone());
        }

        let header = rawdb::read_header(self.db.as_ref(), hash).ok().flatten()?;
        self.headers_cache.lock().put(hash, header.clone());
        Some(header)
    }

    pub fn get_canonical_hash(&self, number: BlockNumber) -> Option<B256> {
        if let Some(hash) = self.canonical_cache.lock().get(&number) {
            return Some(*hash);
        }

        let hash = rawdb::read_canonical_hash(self.db.as_ref(), number).ok().flatten()?;
        self.canonical_cache.lock().put(number, hash);
        Some(hash)
    }

    pub fn get_header_by_number(&self, number: BlockNumber) -> Option<SealedHeader> {
        self.get_header_by_hash(self.get_canonical_hash(number)?)
    }

    pub fn get_td(&self, hash: B256) -> Option<u64> {
        if let Some(td) = self.difficulty_cache.lock().get(&hash) {
            return Some(*td);
        }

        let td = rawdb::read_td(self.db.as_ref(), hash).ok().flatten()?;
        self.difficulty_cache.lock().put(hash, td);
        Some(td)
    }

    /// The block body: ordered transactions resolved through the tx table.
    pub fn get_body_by_hash(&self, hash: B256) -> Result<Option<Body>, ChainError> {
        let Some(tx_hashes) = rawdb::read_body(self.db.as_ref(), hash)? else {
            return Ok(None);
        };

        let mut transactions = Vec::with_capacity(tx_hashes.len());
        for tx_hash in tx_hashes {
            let Some(tx) = rawdb::read_transaction(self.db.as_ref(), tx_hash)? else {
                // a header may exist without its body; never return half a
                // block
                return Ok(None);
            };
            transactions.push(tx);
        }
        Ok(Some(Body { transactions }))
    }

    pub fn get_block_by_number(&self, number: BlockNumber) -> Result<Option<Block>, ChainError> {
        let Some(header) = self.get_header_by_number(number) else { return Ok(None) };

        let body = match self.get_body_by_hash(header.hash())? {
            Some(body) => body,
            // a header that commits to a body it does not have is not served
            // as an empty block
            None if header.has_body() => return Ok(None),
            None => Body::default(),
        };
        Ok(Some(Block::new(header, body.transactions)))
    }

    pub fn get_transaction_by_hash(
        &self,
        hash: B256,
    ) -> Result<Option<Transaction>, ChainError> {
        Ok(rawdb::read_transaction(self.db.as_ref(), hash)?)
    }

    pub fn get_receipt_by_tx_hash(&self, hash: B256) -> Result<Option<Receipt>, ChainError> {
        Ok(rawdb::read_receipt(self.db.as_ref(), hash)?)
    }

    pub fn get_receipts_by_hash(&self, hash: B256) -> Result<Vec<Receipt>, ChainError> {
        let Some(tx_hashes) = rawdb::read_body(self.db.as_ref(), hash)? else {
            return Ok(Vec::new());
        };

        let mut receipts = Vec::with_capacity(tx_hashes.len());
        for tx_hash in tx_hashes {
            if let Some(receipt) = rawdb::read_receipt(self.db.as_ref(), tx_hash)? {
                receipts.push(receipt);
            }
        }
        Ok(receipts)
    }

    /// The rolling average gas price.
    pub fn gas_price_average(&self) -> U256 {
        self.gp_average.lock().price
    }

    pub fn subscribe_events(&self) -> Subscription {
        self.stream.subscribe()
    }

    // genesis boot

    /// Initializes the chain: writes the genesis on an empty store, verifies
    /// it on a populated one, then restores the head.
    pub fn handle_genesis(&self) -> Result<(), ChainError> {
        self.self_check()?;

        // the genesis hash this chain file implies
        let genesis_root = self.executor.write_genesis(&self.spec.genesis.alloc)?;
        let genesis_header = self.spec.genesis.header(genesis_root).seal();
        *self.genesis.write() = genesis_header.hash();

        match rawdb::read_head_hash(self.db.as_ref())? {
            Some(head) => {
                let stored = rawdb::read_canonical_hash(self.db.as_ref(), 0)?
                    .ok_or(ChainError::ParentNotFound(0))?;
                if stored != genesis_header.hash() {
                    return Err(ChainError::GenesisMismatch {
                        stored,
                        computed: genesis_header.hash(),
                    });
                }

                let header = rawdb::read_header(self.db.as_ref(), head)?
                    .ok_or(ChainError::ParentNotFound(0))?;
                let td = self.get_td(head).unwrap_or(header.difficulty);

                info!(target: "blockchain", hash = %head, number = header.number, "current header");
                self.set_current_header(header, td);
            }
            None => {
                self.write_genesis(genesis_header)?;
            }
        }

        info!(target: "blockchain", hash = %self.genesis_hash(), "genesis");
        Ok(())
    }

    fn write_genesis(&self, header: SealedHeader) -> Result<(), ChainError> {
        rawdb::write_td(self.db.as_ref(), header.hash(), header.difficulty)?;
        self.write_header(header)?;
        Ok(())
    }

    /// Startup recovery: a crash may have advanced the head pointer without
    /// the canonical index. Walk the head back one step when that happened.
    pub fn self_check(&self) -> Result<(), ChainError> {
        let Some(head) = rawdb::read_head_hash(self.db.as_ref())? else { return Ok(()) };
        let Some(header) = rawdb::read_header(self.db.as_ref(), head)? else { return Ok(()) };

        if rawdb::read_canonical_hash(self.db.as_ref(), header.number)?.is_none() {
            let Some(parent) = rawdb::read_header(self.db.as_ref(), header.parent_hash)? else {
                return Ok(());
            };

            error!(
                target: "blockchain",
                number = header.number,
                "head points past the canonical index, rewinding one block"
            );
            rawdb::write_head_hash(self.db.as_ref(), parent.hash())?;
            rawdb::write_head_number(self.db.as_ref(), parent.number)?;
        }
        Ok(())
    }

    // verification

    /// Cheap structural checks ahead of execution: parent linkage, header
    /// self-hash and the transactions root.
    pub fn verify_finalized_block(&self, block: &Block) -> Result<(), ChainError> {
        if self.is_stopped() {
            return Err(ChainError::Closed);
        }

        if let Some(head) = rawdb::read_head_number(self.db.as_ref())? {
            if head > block.number() {
                return Err(ChainError::ExistBlock { head, block: block.number() });
            }
        }

        self.verify_header(&block.header)?;

        let tx_root = proofs::calculate_transactions_root(&block.transactions);
        if tx_root != block.header.tx_root {
            error!(
                target: "blockchain",
                have = %tx_root,
                want = %block.header.tx_root,
                "transaction root hash mismatch"
            );
            return Err(ChainError::InvalidTxRoot { have: tx_root, want: block.header.tx_root });
        }

        Ok(())
    }

    pub fn verify_header(&self, header: &SealedHeader) -> Result<(), ChainError> {
        if header.number == 0 {
            return Ok(());
        }

        let parent_hash = self
            .get_canonical_hash(header.number - 1)
            .ok_or(ChainError::ParentNotFound(header.number))?;
        if parent_hash != header.parent_hash {
            return Err(ChainError::InvalidParentHash {
                number: header.number,
                have: header.parent_hash,
                want: parent_hash,
            });
        }

        let computed = header.header().hash_slow();
        if computed != header.hash() {
            return Err(ChainError::InvalidHeaderHash {
                number: header.number,
                have: header.hash(),
                want: computed,
            });
        }

        Ok(())
    }

    // system transactions

    /// Whether `tx` is a Detroit system transaction: a deposit or slash call
    /// into the validator-set contract, signed by the block's coinbase.
    pub fn is_system_transaction(
        &self,
        height: BlockNumber,
        coinbase: dogesync_primitives::Address,
        tx: &Transaction,
    ) -> bool {
        if !self.spec.forks().is_detroit(height) {
            return false;
        }
        if !validatorset::is_deposit_tx(tx) && !validatorset::is_slash_tx(tx) {
            return false;
        }

        let signer = TxSigner::new(self.spec.chain_id(), self.spec.forks().at(height).eip155);
        match signer.sender(tx) {
            Ok(sender) => sender == coinbase,
            Err(_) => false,
        }
    }

    // execution and persistence

    /// Re-executes the block body against the parent's state: normal
    /// transactions in body order first, then system transactions in body
    /// order, under the same block gas limit.
    pub fn execute_block_transactions(&self, block: &Block) -> Result<BlockResult, ChainError> {
        if self.is_stopped() {
            return Err(ChainError::Closed);
        }

        let header = &block.header;
        let parent = rawdb::read_header(self.db.as_ref(), header.parent_hash)?
            .ok_or(ChainError::ParentNotFound(header.number))?;

        let block_creator = crypto::recover_proposer(header.header())?;

        let mut transition =
            self.executor.begin_txn(parent.state_root, header.header(), block_creator)?;

        // system contracts may be upgraded right at a fork activation point
        self.executor.upgrade_system(&mut transition, block.number());

        let mut system_txs = Vec::new();
        let mut normal_txs = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            if self.is_system_transaction(block.number(), block_creator, tx) {
                system_txs.push(tx.clone());
            } else {
                normal_txs.push(tx.clone());
            }
        }

        if !normal_txs.is_empty() {
            self.executor.process_transactions(&mut transition, header.gas_limit, &normal_txs)?;
        }
        if !system_txs.is_empty() {
            self.executor.process_transactions(&mut transition, header.gas_limit, &system_txs)?;
        }

        if self.is_stopped() {
            // execution was told to stop, do not commit
            return Err(ChainError::Closed);
        }

        let receipts = transition.receipts().to_vec();
        let total_gas = transition.total_gas();
        let (_, root) = transition.commit()?;

        Ok(BlockResult { root, receipts, total_gas })
    }

    /// Persists a verified block: body, re-execution with all three root
    /// comparisons, receipts, header, head advance, disk sync, average gas
    /// price, event.
    pub fn write_block(&self, block: &Block) -> Result<(), ChainError> {
        if self.is_stopped() {
            return Err(ChainError::Closed);
        }

        let header = &block.header;
        info!(target: "blockchain", number = block.number(), parent = %block.parent_hash(), "write block");

        // bodies first: the tx table may hold unreferenced transactions,
        // which is harmless, while a header without its txs is not
        rawdb::write_transactions(self.db.as_ref(), &block.transactions)?;
        rawdb::write_body(self.db.as_ref(), block.hash(), &block.transactions)?;

        if header.has_body() {
            let result = self.execute_block_transactions(block)?;

            let receipts_root = proofs::calculate_receipts_root(&result.receipts);
            if receipts_root != header.receipts_root {
                return Err(ChainError::InvalidReceiptsRoot {
                    have: receipts_root,
                    want: header.receipts_root,
                });
            }

            let tx_root = proofs::calculate_transactions_root(&block.transactions);
            if tx_root != header.tx_root {
                return Err(ChainError::InvalidTxRoot { have: tx_root, want: header.tx_root });
            }

            if result.root != header.state_root {
                return Err(ChainError::InvalidStateRoot {
                    have: result.root,
                    want: header.state_root,
                });
            }

            rawdb::write_receipts(self.db.as_ref(), &result.receipts)?;
        }

        self.write_header(header.clone())?;

        // make the whole block durable before acknowledging it
        self.db.sync().map_err(|err| ChainError::RawDb(err.into()))?;

        self.update_gas_price_avg_with_block(block);

        info!(
            target: "blockchain",
            number = header.number,
            hash = %header.hash(),
            txns = block.transactions.len(),
            "new block"
        );
        Ok(())
    }

    /// Persists a header and atomically advances the head.
    pub fn write_header(&self, header: SealedHeader) -> Result<(), ChainError> {
        rawdb::write_header(self.db.as_ref(), &header)?;
        self.add_header_snapshot(&header)?;

        let td = self.advance_head(&header)?;

        let mut event = Event::new(EventType::Head);
        event.difficulty = td;
        event.add_new_header(header);
        self.stream.push(event);

        Ok(())
    }

    /// Records the validator set of this header as a consensus snapshot.
    /// Headers without an IBFT envelope (fixtures) are skipped.
    fn add_header_snapshot(&self, header: &SealedHeader) -> Result<(), ChainError> {
        let Ok(extra) = header.ibft_extra() else { return Ok(()) };

        let snapshot = rawdb::Snapshot {
            number: header.number,
            hash: header.hash().to_string(),
            votes: Vec::new(),
            set: extra.validators,
        };
        Ok(rawdb::write_snapshot(self.db.as_ref(), &snapshot)?)
    }

    fn advance_head(&self, header: &SealedHeader) -> Result<u64, ChainError> {
        rawdb::write_head_hash(self.db.as_ref(), header.hash())?;
        rawdb::write_head_number(self.db.as_ref(), header.number)?;
        rawdb::write_canonical_hash(self.db.as_ref(), header.number, header.hash())?;

        let parent_td = if header.number == 0 {
            0
        } else {
            self.get_td(header.parent_hash).unwrap_or(0)
        };
        let td = parent_td + header.difficulty;
        rawdb::write_td(self.db.as_ref(), header.hash(), td)?;

        self.canonical_cache.lock().put(header.number, header.hash());
        self.difficulty_cache.lock().put(header.hash(), td);
        self.set_current_header(header.clone(), td);

        Ok(td)
    }

    // gas limit and gas price

    /// The gas limit of the block after `number - 1`: the parent limit when
    /// no target is configured, otherwise moved toward the target by at most
    /// parent/1024.
    pub fn calculate_gas_limit(&self, number: BlockNumber) -> Result<u64, ChainError> {
        let parent = self
            .get_header_by_number(number.saturating_sub(1))
            .ok_or(ChainError::ParentNotFound(number))?;

        Ok(self.next_gas_limit(parent.gas_limit))
    }

    fn next_gas_limit(&self, parent_gas_limit: u64) -> u64 {
        let target = self.spec.params.block_gas_target;
        if target == 0 || parent_gas_limit == target {
            return if target == 0 { parent_gas_limit } else { target };
        }

        let delta = parent_gas_limit / BLOCK_GAS_TARGET_DIVISOR;
        if parent_gas_limit < target {
            target.min(parent_gas_limit + delta)
        } else {
            target.max(parent_gas_limit.saturating_sub(delta))
        }
    }

    fn update_gas_price_avg_with_block(&self, block: &Block) {
        if block.transactions.is_empty() {
            return;
        }

        let prices: Vec<U256> = block.transactions.iter().map(|tx| tx.gas_price).collect();
        self.update_gas_price_avg(&prices);
    }

    /// `new average = old average * (n - m)/n + sum(M)/n`, where `n` is the
    /// running count and `M` the new price set.
    fn update_gas_price_avg(&self, new_values: &[U256]) {
        let mut average = self.gp_average.lock();

        let mut sum = U256::ZERO;
        for value in new_values {
            sum = sum.saturating_add(*value);
        }
        let input_count = U256::from(new_values.len() as u64);

        if average.count.is_zero() {
            average.price = sum / input_count;
            average.count = input_count;
            return;
        }

        let old_count = average.count;
        let scaled = average
            .price
            .saturating_mul(old_count.saturating_sub(input_count)) /
            old_count;
        average.price = scaled + sum / old_count;
        average.count = old_count + input_count;
    }
}

fn nonzero(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).expect("nonzero cache size")
}
