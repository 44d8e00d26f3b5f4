//! End-to-end chain scenarios over an in-memory store.

use dogesync_blockchain::{Blockchain, ChainError};
use dogesync_chainspec::{ChainSpec, Forks, Genesis, GenesisAccount, Params};
use dogesync_contracts::{validatorset, VALIDATOR_SET_CONTRACT};
use dogesync_kvdb::{Database, MemDb};
use dogesync_primitives::{
    crypto::{address_of, seal_header, TxSigner},
    ibft, proofs, Address, Block, Bytes, Header, Transaction, B256, U256,
};
use dogesync_state::{Executor, TX_GAS};
use dogesync_trie::{KvTrieStorage, State};
use secp256k1::SecretKey;
use std::{collections::BTreeMap, sync::Arc};

const CHAIN_ID: u64 = 2000;

fn proposer_key() -> SecretKey {
    SecretKey::from_slice(&[0x21u8; 32]).expect("valid key")
}

fn sender_key() -> SecretKey {
    SecretKey::from_slice(&[0x22u8; 32]).expect("valid key")
}

fn spec() -> ChainSpec {
    let mut alloc = BTreeMap::new();
    alloc.insert(
        address_of(&sender_key()),
        GenesisAccount { balance: U256::from(10u64).pow(U256::from(18u64)), ..Default::default() },
    );

    ChainSpec {
        name: "dogesync-test".into(),
        genesis: Genesis {
            gas_limit: 8_000_000,
            difficulty: 1,
            timestamp: 1_700_000_000,
            alloc,
            ..Default::default()
        },
        params: Params {
            chain_id: CHAIN_ID,
            forks: Forks::all_at_genesis(),
            ..Default::default()
        },
        bootnodes: Vec::new(),
    }
}

fn chain_over(db: Arc<dyn Database>) -> Arc<Blockchain> {
    let spec = Arc::new(spec());
    let state = Arc::new(State::new(Arc::new(KvTrieStorage::new(Arc::clone(&db)))));
    let executor = Arc::new(Executor::new(&spec.params, Arc::clone(&state)));
    Blockchain::new(spec, db, state, executor)
}

fn chain() -> Arc<Blockchain> {
    chain_over(Arc::new(MemDb::new()))
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

/// Builds a sealed, fully-rooted block on the current head: executes the
/// body once to learn the roots, then seals the final header.
fn build_block(chain: &Blockchain, transactions: Vec<Transaction>) -> Block {
    let parent = chain.header().expect("chain initialized");
    let proposer = address_of(&proposer_key());

    let mut header = Header {
        parent_hash: parent.hash(),
        number: parent.number + 1,
        gas_limit: parent.gas_limit,
        timestamp: parent.timestamp + 2,
        miner: proposer,
        tx_root: proofs::calculate_transactions_root(&transactions),
        ..Default::default()
    };
    header.extra_data = ibft::put_ibft_extra_validators(&Bytes::new(), &[proposer]);

    // probe run to learn the state and receipts roots
    let sealed = seal_header(header.clone(), &proposer_key()).expect("seal");
    let probe = Block::new(sealed.seal(), transactions.clone());
    let result = chain.execute_block_transactions(&probe).expect("probe execution");

    header.receipts_root = proofs::calculate_receipts_root(&result.receipts);
    header.state_root = result.root;
    header.gas_used = result.total_gas;

    let sealed = seal_header(header, &proposer_key()).expect("seal");
    Block::new(sealed.seal(), transactions)
}

#[test]
fn genesis_boot_and_restart() {
    let db: Arc<dyn Database> = Arc::new(MemDb::new());

    let chain = chain_over(Arc::clone(&db));
    chain.handle_genesis().unwrap();

    let head = chain.header().unwrap();
    assert_eq!(head.number, 0);
    assert_eq!(head.hash(), chain.genesis_hash());
    assert_eq!(chain.get_canonical_hash(0), Some(head.hash()));
    assert_eq!(chain.get_td(head.hash()), Some(1));
    assert_eq!(chain.current_td(), 1);

    // restarting over the same store converges on the same head
    let restarted = chain_over(db);
    restarted.handle_genesis().unwrap();
    assert_eq!(restarted.header().unwrap().hash(), head.hash());
}

#[test]
fn single_transfer_block() {
    let chain = chain();
    chain.handle_genesis().unwrap();

    let receiver = Address::repeat_byte(0xbb);
    let tx = transfer(0, receiver, 1);
    let block = build_block(&chain, vec![tx.clone()]);

    chain.verify_finalized_block(&block).unwrap();
    chain.write_block(&block).unwrap();

    let head = chain.header().unwrap();
    assert_eq!(head.number, 1);
    assert_eq!(chain.get_canonical_hash(1), Some(block.hash()));
    // td accumulates along the canonical chain
    assert_eq!(chain.get_td(block.hash()), Some(1 + block.header.difficulty));

    let receipts = chain.get_receipts_by_hash(block.hash()).unwrap();
    assert_eq!(receipts.len(), 1);
    assert!(receipts[0].success());
    assert_eq!(receipts[0].cumulative_gas_used, TX_GAS);
    assert_eq!(receipts[0].tx_hash, tx.hash());

    // average gas price picked up the block
    assert_eq!(chain.gas_price_average(), U256::from(1u64));
}

#[test]
fn tampered_state_root_is_rejected() {
    let chain = chain();
    chain.handle_genesis().unwrap();

    let block = build_block(&chain, vec![transfer(0, Address::repeat_byte(1), 5)]);

    let mut header = block.header.header().clone();
    header.state_root = B256::repeat_byte(0x66);
    let tampered =
        Block::new(seal_header(header, &proposer_key()).unwrap().seal(), block.transactions);

    let err = chain.write_block(&tampered).unwrap_err();
    assert!(matches!(err, ChainError::InvalidStateRoot { .. }));
    // the head did not move
    assert_eq!(chain.header().unwrap().number, 0);
}

#[test]
fn verify_rejects_unknown_parent_and_bad_tx_root() {
    let chain = chain();
    chain.handle_genesis().unwrap();

    let mut block = build_block(&chain, vec![transfer(0, Address::repeat_byte(1), 5)]);

    // a block number with no canonical parent
    let mut orphan_header = block.header.header().clone();
    orphan_header.number = 5;
    let orphan = Block::new(
        seal_header(orphan_header, &proposer_key()).unwrap().seal(),
        block.transactions.clone(),
    );
    assert!(matches!(
        chain.verify_finalized_block(&orphan),
        Err(ChainError::ParentNotFound(5))
    ));

    // a body that does not match the committed root
    block.transactions.push(transfer(1, Address::repeat_byte(2), 6));
    assert!(matches!(
        chain.verify_finalized_block(&block),
        Err(ChainError::InvalidTxRoot { .. })
    ));
}

#[test]
fn system_transactions_execute_after_normal_ones() {
    let chain = chain();
    chain.handle_genesis().unwrap();

    let proposer = address_of(&proposer_key());

    // T1 normal, T2 slash signed by the coinbase, T3 normal
    let t1 = transfer(0, Address::repeat_byte(1), 1);
    let slash = Transaction {
        nonce: 0,
        gas_price: U256::ZERO,
        gas: validatorset::SYSTEM_TRANSACTION_GAS_LIMIT,
        to: Some(VALIDATOR_SET_CONTRACT),
        value: U256::ZERO,
        input: validatorset::slash_input(Address::repeat_byte(0xee)).into(),
        ..Default::default()
    };
    let t2 = TxSigner::new(CHAIN_ID, true).sign(slash, &proposer_key()).unwrap();
    let t3 = transfer(1, Address::repeat_byte(2), 1);

    assert!(chain.is_system_transaction(1, proposer, &t2));
    assert!(!chain.is_system_transaction(1, proposer, &t1));

    let block = build_block(&chain, vec![t1.clone(), t2.clone(), t3.clone()]);
    let result = chain.execute_block_transactions(&block).unwrap();

    let order: Vec<_> = result.receipts.iter().map(|r| r.tx_hash).collect();
    assert_eq!(order, vec![t1.hash(), t3.hash(), t2.hash()]);

    // the header roots were computed over the same order, so the block lands
    chain.write_block(&block).unwrap();
    assert_eq!(chain.header().unwrap().number, 1);
}

#[test]
fn self_check_rewinds_dangling_head() {
    let db: Arc<dyn Database> = Arc::new(MemDb::new());
    let chain = chain_over(Arc::clone(&db));
    chain.handle_genesis().unwrap();

    let block = build_block(&chain, vec![transfer(0, Address::repeat_byte(1), 1)]);
    chain.write_block(&block).unwrap();

    // simulate a crash that advanced the head without the canonical index
    let orphan = Header {
        parent_hash: block.hash(),
        number: 2,
        gas_limit: 8_000_000,
        ..Default::default()
    }
    .seal();
    dogesync_rawdb::write_header(db.as_ref(), &orphan).unwrap();
    dogesync_rawdb::write_head_hash(db.as_ref(), orphan.hash()).unwrap();
    dogesync_rawdb::write_head_number(db.as_ref(), 2).unwrap();

    chain.self_check().unwrap();
    assert_eq!(dogesync_rawdb::read_head_hash(db.as_ref()).unwrap(), Some(block.hash()));
    assert_eq!(dogesync_rawdb::read_head_number(db.as_ref()).unwrap(), Some(1));
}

#[test]
fn gas_limit_moves_toward_target() {
    let db: Arc<dyn Database> = Arc::new(MemDb::new());
    let mut spec = spec();
    spec.params.block_gas_target = 10_000_000;

    let spec = Arc::new(spec);
    let state = Arc::new(State::new(Arc::new(KvTrieStorage::new(Arc::clone(&db)))));
    let executor = Arc::new(Executor::new(&spec.params, Arc::clone(&state)));
    let chain = Blockchain::new(spec, db, state, executor);
    chain.handle_genesis().unwrap();

    // parent is at 8M, target at 10M: one step of parent/1024 up
    let next = chain.calculate_gas_limit(1).unwrap();
    assert_eq!(next, 8_000_000 + 8_000_000 / 1024);
}
