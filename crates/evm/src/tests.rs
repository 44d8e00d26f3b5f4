use crate::{
    CallType, Contract, Evm, ExecutionResult, Host, Runtime, StorageStatus, TxContext, VmError,
};
use dogesync_chainspec::{Forks, ForksInTime};
use dogesync_primitives::{Address, B256, U256};
use std::collections::HashMap;

/// Minimal in-memory host for interpreter tests.
#[derive(Default)]
struct TestHost {
    storage: HashMap<(Address, B256), B256>,
    balances: HashMap<Address, U256>,
    logs: Vec<(Address, Vec<B256>, Vec<u8>)>,
    refund: u64,
    context: TxContext,
}

impl Host for TestHost {
    fn account_exists(&mut self, address: Address) -> bool {
        self.balances.contains_key(&address)
    }

    fn empty_account(&mut self, address: Address) -> bool {
        !self.balances.contains_key(&address)
    }

    fn get_nonce(&mut self, _address: Address) -> u64 {
        0
    }

    fn get_balance(&mut self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    fn get_code(&mut self, _address: Address) -> Vec<u8> {
        Vec::new()
    }

    fn get_code_size(&mut self, _address: Address) -> usize {
        0
    }

    fn get_code_hash(&mut self, _address: Address) -> B256 {
        B256::ZERO
    }

    fn get_storage(&mut self, address: Address, key: B256) -> B256 {
        self.storage.get(&(address, key)).copied().unwrap_or_default()
    }

    fn set_storage(
        &mut self,
        address: Address,
        key: B256,
        value: B256,
        _forks: &ForksInTime,
    ) -> StorageStatus {
        let previous = self.storage.insert((address, key), value).unwrap_or_default();
        match (previous.is_zero(), value.is_zero()) {
            (true, false) => StorageStatus::Added,
            (false, true) => StorageStatus::Deleted,
            (false, false) if previous != value => StorageStatus::Modified,
            _ => StorageStatus::Unchanged,
        }
    }

    fn add_refund(&mut self, gas: u64) {
        self.refund += gas;
    }

    fn refund(&mut self) -> u64 {
        self.refund
    }

    fn selfdestruct(&mut self, address: Address, _beneficiary: Address) {
        self.balances.remove(&address);
    }

    fn has_suicided(&mut self, _address: Address) -> bool {
        false
    }

    fn emit_log(&mut self, address: Address, topics: Vec<B256>, data: Vec<u8>) {
        self.logs.push((address, topics, data));
    }

    fn get_tx_context(&self) -> TxContext {
        self.context
    }

    fn get_block_hash(&mut self, number: u64) -> B256 {
        B256::with_last_byte(number as u8)
    }

    fn callx(&mut self, _contract: Contract) -> ExecutionResult {
        ExecutionResult::default()
    }
}

fn run(code: Vec<u8>, gas: u64) -> (ExecutionResult, TestHost) {
    run_with(code, gas, false)
}

fn run_with(code: Vec<u8>, gas: u64, is_static: bool) -> (ExecutionResult, TestHost) {
    let mut host = TestHost::default();
    let forks = Forks::all_at_genesis().at(0);
    let mut contract = Contract::new_call(
        CallType::Call,
        0,
        Address::repeat_byte(1),
        Address::repeat_byte(2),
        U256::ZERO,
        gas,
        code,
        Vec::new(),
    );
    contract.is_static = is_static;

    let result = Evm.run(&contract, &mut host, &forks);
    (result, host)
}

#[test]
fn add_and_return() {
    // PUSH1 2, PUSH1 3, ADD, PUSH1 0, MSTORE, PUSH1 32, PUSH1 0, RETURN
    let code = vec![0x60, 0x02, 0x60, 0x03, 0x01, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3];
    let (result, _) = run(code, 100_000);

    assert!(!result.failed());
    assert_eq!(U256::from_be_slice(&result.return_value), U256::from(5u64));
}

#[test]
fn out_of_gas_consumes_everything() {
    let code = vec![0x60, 0x02, 0x60, 0x03, 0x01];
    let (result, _) = run(code, 5);

    assert_eq!(result.err, Some(VmError::OutOfGas));
    assert_eq!(result.gas_left, 0);
}

#[test]
fn unknown_opcode() {
    let (result, _) = run(vec![0x0c], 10_000);
    assert_eq!(result.err, Some(VmError::OpCodeNotFound));
}

#[test]
fn stack_underflow() {
    let (result, _) = run(vec![0x01], 10_000);
    assert_eq!(result.err, Some(VmError::StackUnderflow));
}

#[test]
fn invalid_jump_is_rejected() {
    // PUSH1 3, JUMP; offset 3 is not a JUMPDEST
    let (result, _) = run(vec![0x60, 0x03, 0x56, 0x00], 10_000);
    assert_eq!(result.err, Some(VmError::InvalidJump));
}

#[test]
fn jump_to_jumpdest_continues() {
    // PUSH1 4, JUMP, STOP(skipped dead byte), JUMPDEST, PUSH1 1, PUSH1 0,
    // MSTORE, PUSH1 32, PUSH1 0, RETURN
    let code = vec![
        0x60, 0x04, 0x56, 0xfe, 0x5b, 0x60, 0x01, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3,
    ];
    let (result, _) = run(code, 100_000);
    assert!(!result.failed());
    assert_eq!(U256::from_be_slice(&result.return_value), U256::from(1u64));
}

#[test]
fn revert_returns_data_and_keeps_gas() {
    // PUSH1 0xaa, PUSH1 0, MSTORE, PUSH1 32, PUSH1 0, REVERT
    let code = vec![0x60, 0xaa, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xfd];
    let (result, _) = run(code, 100_000);

    assert!(result.reverted());
    assert!(result.gas_left > 0);
    assert_eq!(U256::from_be_slice(&result.return_value), U256::from(0xaau64));
}

#[test]
fn static_frame_rejects_state_writes() {
    // PUSH1 1, PUSH1 0, SSTORE
    let code = vec![0x60, 0x01, 0x60, 0x00, 0x55];
    let (result, _) = run_with(code, 100_000, true);
    assert_eq!(result.err, Some(VmError::WriteProtection));

    // LOG0 is also a write
    let code = vec![0x60, 0x00, 0x60, 0x00, 0xa0];
    let (result, _) = run_with(code, 100_000, true);
    assert_eq!(result.err, Some(VmError::WriteProtection));
}

#[test]
fn sstore_and_sload_roundtrip() {
    // PUSH1 0x2a, PUSH1 1, SSTORE, PUSH1 1, SLOAD, PUSH1 0, MSTORE,
    // PUSH1 32, PUSH1 0, RETURN
    let code = vec![
        0x60, 0x2a, 0x60, 0x01, 0x55, 0x60, 0x01, 0x54, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00,
        0xf3,
    ];
    let (result, host) = run(code, 100_000);

    assert!(!result.failed());
    assert_eq!(U256::from_be_slice(&result.return_value), U256::from(0x2au64));
    assert_eq!(
        host.storage[&(Address::repeat_byte(2), B256::with_last_byte(1))],
        B256::with_last_byte(0x2a)
    );
}

#[test]
fn logs_are_emitted_with_topics() {
    // PUSH1 topic, PUSH1 0(size), PUSH1 0(offset) ... LOG1 pops offset,
    // size, topic
    let code = vec![0x60, 0x07, 0x60, 0x00, 0x60, 0x00, 0xa1];
    let (result, host) = run(code, 100_000);

    assert!(!result.failed());
    assert_eq!(host.logs.len(), 1);
    let (address, topics, data) = &host.logs[0];
    assert_eq!(*address, Address::repeat_byte(2));
    assert_eq!(topics, &vec![B256::with_last_byte(7)]);
    assert!(data.is_empty());
}

#[test]
fn signed_division() {
    // -4 / 2 == -2: PUSH 2, PUSH -4, SDIV
    let mut code = vec![0x60, 0x02];
    code.push(0x7f);
    code.extend_from_slice(&neg_word(4));
    code.push(0x05);
    // store and return
    code.extend_from_slice(&[0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3]);

    let (result, _) = run(code, 100_000);
    assert!(!result.failed());
    assert_eq!(result.return_value, neg_word(2).to_vec());
}

#[test]
fn memory_expansion_is_charged() {
    // MSTORE at a large offset: PUSH1 1, PUSH3 0xffffff, MSTORE
    let code = vec![0x60, 0x01, 0x62, 0xff, 0xff, 0xff, 0x52];
    let (result, _) = run(code, 10_000);
    assert_eq!(result.err, Some(VmError::OutOfGas));
}

#[test]
fn stack_overflow_detected() {
    // unconditional push loop: JUMPDEST, PUSH1 0, PUSH1 0, JUMP
    let code = vec![0x5b, 0x60, 0x00, 0x60, 0x00, 0x56];
    let (result, _) = run(code, 10_000_000);
    assert_eq!(result.err, Some(VmError::StackOverflow));
}

fn neg_word(value: u64) -> [u8; 32] {
    let negated = (!U256::from(value)).wrapping_add(U256::from(1u8));
    negated.to_be_bytes::<32>()
}
