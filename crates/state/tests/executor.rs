//! Block-level execution against an in-memory store.

use dogesync_chainspec::{Forks, GenesisAccount, Params};
use dogesync_primitives::{
    crypto::{address_of, TxSigner},
    Address, Header, Transaction, U256,
};
use dogesync_state::{ExecError, Executor, TX_GAS};
use dogesync_trie::{KvTrieStorage, State};
use secp256k1::SecretKey;
use std::{collections::BTreeMap, sync::Arc};

const CHAIN_ID: u64 = 2000;

fn secret() -> SecretKey {
    SecretKey::from_slice(&[0x42u8; 32]).expect("valid key")
}

fn executor() -> Executor {
    let storage = Arc::new(KvTrieStorage::new(Arc::new(dogesync_kvdb::MemDb::new())));
    let state = Arc::new(State::new(storage));
    let params = Params {
        chain_id: CHAIN_ID,
        forks: Forks::all_at_genesis(),
        ..Default::default()
    };
    Executor::new(&params, state)
}

fn funded_alloc(address: Address) -> BTreeMap<Address, GenesisAccount> {
    let mut alloc = BTreeMap::new();
    alloc.insert(
        address,
        GenesisAccount {
            balance: U256::from(10u64).pow(U256::from(18u64)),
            ..Default::default()
        },
    );
    alloc
}

fn header(number: u64) -> Header {
    Header { number, gas_limit: 8_000_000, timestamp: 1_700_000_000, ..Default::default() }
}

fn signed_transfer(nonce: u64, to: Address, value: u64, gas_price: u64) -> Transaction {
    let tx = Transaction {
        nonce,
        gas_price: U256::from(gas_price),
        gas: TX_GAS,
        to: Some(to),
        value: U256::from(value),
        ..Default::default()
    };
    TxSigner::new(CHAIN_ID, true).sign(tx, &secret()).expect("signing")
}

#[test]
fn genesis_alloc_determines_root() {
    let executor = executor();
    let sender = address_of(&secret());

    let root_a = executor.write_genesis(&funded_alloc(sender)).unwrap();
    let root_b = executor.write_genesis(&funded_alloc(sender)).unwrap();
    assert_eq!(root_a, root_b);

    let other = executor.write_genesis(&funded_alloc(Address::repeat_byte(9))).unwrap();
    assert_ne!(root_a, other);
}

#[test]
fn single_transfer_settles_balances() {
    let executor = executor();
    let sender = address_of(&secret());
    let receiver = Address::repeat_byte(0xbb);
    let coinbase = Address::repeat_byte(0xcc);

    let genesis_root = executor.write_genesis(&funded_alloc(sender)).unwrap();

    let mut transition = executor.begin_txn(genesis_root, &header(1), coinbase).unwrap();
    let tx = signed_transfer(0, receiver, 1, 1);
    executor
        .process_transactions(&mut transition, 8_000_000, std::slice::from_ref(&tx))
        .unwrap();

    let receipts = transition.receipts().to_vec();
    assert_eq!(receipts.len(), 1);
    assert!(receipts[0].success());
    assert_eq!(receipts[0].cumulative_gas_used, TX_GAS);
    assert_eq!(receipts[0].gas_used, TX_GAS);
    assert_eq!(receipts[0].tx_hash, tx.hash());

    let (_, root) = transition.commit().unwrap();
    assert_ne!(root, genesis_root);

    // the committed state reflects the transfer and the fee flow
    let mut check = executor.begin_txn(root, &header(2), coinbase).unwrap();
    let txn = check.txn_mut();
    let initial = U256::from(10u64).pow(U256::from(18u64));
    assert_eq!(txn.get_balance(sender), initial - U256::from(TX_GAS + 1));
    assert_eq!(txn.get_balance(receiver), U256::from(1u64));
    assert_eq!(txn.get_balance(coinbase), U256::from(TX_GAS));
    assert_eq!(txn.get_nonce(sender), 1);
}

#[test]
fn replaying_a_block_is_deterministic() {
    let run = || {
        let executor = executor();
        let sender = address_of(&secret());
        let genesis_root = executor.write_genesis(&funded_alloc(sender)).unwrap();
        let mut transition =
            executor.begin_txn(genesis_root, &header(1), Address::repeat_byte(0xcc)).unwrap();
        let txs =
            vec![signed_transfer(0, Address::repeat_byte(1), 5, 1), signed_transfer(1, Address::repeat_byte(2), 7, 1)];
        executor.process_transactions(&mut transition, 8_000_000, &txs).unwrap();
        transition.commit().unwrap().1
    };

    assert_eq!(run(), run());
}

#[test]
fn wrong_nonce_is_rejected() {
    let executor = executor();
    let sender = address_of(&secret());
    let genesis_root = executor.write_genesis(&funded_alloc(sender)).unwrap();

    let mut transition =
        executor.begin_txn(genesis_root, &header(1), Address::repeat_byte(0xcc)).unwrap();
    let tx = signed_transfer(5, Address::repeat_byte(1), 1, 1);

    let err = transition.write(&tx).unwrap_err();
    assert!(matches!(err, ExecError::NonceTooHigh { actual: 5, wanted: 0 }));
}

#[test]
fn unfunded_sender_cannot_pay_for_gas() {
    let executor = executor();
    // fund a different account than the signer
    let genesis_root = executor.write_genesis(&funded_alloc(Address::repeat_byte(7))).unwrap();

    let mut transition =
        executor.begin_txn(genesis_root, &header(1), Address::repeat_byte(0xcc)).unwrap();
    let tx = signed_transfer(0, Address::repeat_byte(1), 1, 1);

    let err = transition.write(&tx).unwrap_err();
    assert!(matches!(err, ExecError::NotEnoughFundsForGas));
}

#[test]
fn oversized_transaction_gets_failed_receipt() {
    let executor = executor();
    let sender = address_of(&secret());
    let genesis_root = executor.write_genesis(&funded_alloc(sender)).unwrap();

    let mut transition =
        executor.begin_txn(genesis_root, &header(1), Address::repeat_byte(0xcc)).unwrap();

    let mut oversized = Transaction {
        nonce: 0,
        gas_price: U256::from(1u64),
        gas: 8_000_001,
        to: Some(Address::repeat_byte(1)),
        value: U256::ZERO,
        ..Default::default()
    };
    oversized = TxSigner::new(CHAIN_ID, true).sign(oversized, &secret()).unwrap();

    executor
        .process_transactions(&mut transition, 8_000_000, std::slice::from_ref(&oversized))
        .unwrap();

    let receipts = transition.receipts();
    assert_eq!(receipts.len(), 1);
    assert!(!receipts[0].success());
    assert_eq!(receipts[0].gas_used, 0);
}

#[test]
fn stopped_executor_halts_processing() {
    let executor = executor();
    let sender = address_of(&secret());
    let genesis_root = executor.write_genesis(&funded_alloc(sender)).unwrap();

    let mut transition =
        executor.begin_txn(genesis_root, &header(1), Address::repeat_byte(0xcc)).unwrap();

    executor.stop();
    let tx = signed_transfer(0, Address::repeat_byte(1), 1, 1);
    let err = executor
        .process_transactions(&mut transition, 8_000_000, std::slice::from_ref(&tx))
        .unwrap_err();
    assert!(matches!(err, ExecError::ExecutionStop));
}

#[test]
fn intrinsic_gas_grows_with_input() {
    use dogesync_state::transaction_gas_cost;

    let plain = Transaction { gas: TX_GAS, to: Some(Address::ZERO), ..Default::default() };
    assert_eq!(transaction_gas_cost(&plain, true, true).unwrap(), TX_GAS);

    let with_input = Transaction {
        gas: TX_GAS,
        to: Some(Address::ZERO),
        input: vec![0u8, 1, 2, 0].into(),
        ..Default::default()
    };
    // two zero bytes at 4 gas, two non-zero at 16 (istanbul)
    assert_eq!(
        transaction_gas_cost(&with_input, true, true).unwrap(),
        TX_GAS + 2 * 4 + 2 * 16
    );
    // pre-istanbul non-zero bytes cost 68
    assert_eq!(
        transaction_gas_cost(&with_input, true, false).unwrap(),
        TX_GAS + 2 * 4 + 2 * 68
    );

    let creation = Transaction { gas: TX_GAS, to: None, ..Default::default() };
    assert_eq!(transaction_gas_cost(&creation, true, true).unwrap(), 53_000);
    assert_eq!(transaction_gas_cost(&creation, false, true).unwrap(), TX_GAS);
}
