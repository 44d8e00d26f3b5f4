//! Opcode handlers. Stack arity and the base gas of each instruction are
//! enforced by the dispatch loop; handlers charge any fork- or size-
//! dependent remainder themselves.

use crate::{
    host::StorageStatus,
    interpreter::{VmState, MAX_CALL_DEPTH},
    CallType, Contract, VmError,
};
use dogesync_primitives::{crypto, keccak256, Address, B256, U256};

const WORD: u64 = 32;
const COPY_GAS_PER_WORD: u64 = 3;
const SHA3_GAS_PER_WORD: u64 = 6;
const LOG_TOPIC_GAS: u64 = 375;
const LOG_DATA_GAS: u64 = 8;
const CALL_STIPEND: u64 = 2300;
const NEW_ACCOUNT_GAS: u64 = 25_000;
const CALL_VALUE_GAS: u64 = 9_000;

fn words(len: u64) -> u64 {
    (len + WORD - 1) / WORD
}

fn to_u64(value: U256) -> Option<u64> {
    u64::try_from(value).ok()
}

fn bool_word(value: bool) -> U256 {
    if value {
        U256::from(1u8)
    } else {
        U256::ZERO
    }
}

fn to_address(value: U256) -> Address {
    Address::from_slice(&value.to_be_bytes::<32>()[12..])
}

fn address_word(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

// Two's-complement helpers. The word type is unsigned; sign is bit 255.

fn is_neg(value: U256) -> bool {
    value.bit(255)
}

fn neg(value: U256) -> U256 {
    (!value).wrapping_add(U256::from(1u8))
}

fn abs(value: U256) -> U256 {
    if is_neg(value) {
        neg(value)
    } else {
        value
    }
}

// arithmetic

pub(crate) fn op_add(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    vm.push(a.wrapping_add(b));
}

pub(crate) fn op_mul(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    vm.push(a.wrapping_mul(b));
}

pub(crate) fn op_sub(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    vm.push(a.wrapping_sub(b));
}

pub(crate) fn op_div(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    vm.push(a.checked_div(b).unwrap_or(U256::ZERO));
}

pub(crate) fn op_sdiv(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    if b.is_zero() {
        vm.push(U256::ZERO);
        return;
    }

    let quotient = abs(a).checked_div(abs(b)).unwrap_or(U256::ZERO);
    vm.push(if is_neg(a) != is_neg(b) { neg(quotient) } else { quotient });
}

pub(crate) fn op_mod(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    vm.push(a.checked_rem(b).unwrap_or(U256::ZERO));
}

pub(crate) fn op_smod(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    if b.is_zero() {
        vm.push(U256::ZERO);
        return;
    }

    let remainder = abs(a).checked_rem(abs(b)).unwrap_or(U256::ZERO);
    vm.push(if is_neg(a) { neg(remainder) } else { remainder });
}

pub(crate) fn op_addmod(vm: &mut VmState) {
    let (a, b, m) = (vm.pop(), vm.pop(), vm.pop());
    if m.is_zero() {
        vm.push(U256::ZERO);
        return;
    }
    vm.push(a.add_mod(b, m));
}

pub(crate) fn op_mulmod(vm: &mut VmState) {
    let (a, b, m) = (vm.pop(), vm.pop(), vm.pop());
    if m.is_zero() {
        vm.push(U256::ZERO);
        return;
    }
    vm.push(a.mul_mod(b, m));
}

pub(crate) fn op_exp(vm: &mut VmState) {
    let (base, exponent) = (vm.pop(), vm.pop());

    let per_byte = if vm.forks.eip158 { 50 } else { 10 };
    let exp_bytes = (exponent.bit_len() as u64 + 7) / 8;
    if !vm.consume_gas(per_byte * exp_bytes) {
        return;
    }

    // square and multiply, wrapping
    let mut result = U256::from(1u8);
    let mut base = base;
    let mut exponent = exponent;
    while !exponent.is_zero() {
        if exponent.bit(0) {
            result = result.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exponent = exponent >> 1usize;
    }
    vm.push(result);
}

pub(crate) fn op_signextend(vm: &mut VmState) {
    let (k, value) = (vm.pop(), vm.pop());
    let Some(k) = to_u64(k) else {
        vm.push(value);
        return;
    };
    if k >= 31 {
        vm.push(value);
        return;
    }

    let bit = (k * 8 + 7) as usize;
    let result = if value.bit(bit) {
        value | (U256::MAX << (bit + 1))
    } else {
        value & ((U256::from(1u8) << (bit + 1)).wrapping_sub(U256::from(1u8)))
    };
    vm.push(result);
}

// comparison and bitwise

pub(crate) fn op_lt(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    vm.push(bool_word(a < b));
}

pub(crate) fn op_gt(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    vm.push(bool_word(a > b));
}

pub(crate) fn op_slt(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    let result = match (is_neg(a), is_neg(b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    };
    vm.push(bool_word(result));
}

pub(crate) fn op_sgt(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    let result = match (is_neg(a), is_neg(b)) {
        (true, false) => false,
        (false, true) => true,
        _ => a > b,
    };
    vm.push(bool_word(result));
}

pub(crate) fn op_eq(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    vm.push(bool_word(a == b));
}

pub(crate) fn op_iszero(vm: &mut VmState) {
    let a = vm.pop();
    vm.push(bool_word(a.is_zero()));
}

pub(crate) fn op_and(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    vm.push(a & b);
}

pub(crate) fn op_or(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    vm.push(a | b);
}

pub(crate) fn op_xor(vm: &mut VmState) {
    let (a, b) = (vm.pop(), vm.pop());
    vm.push(a ^ b);
}

pub(crate) fn op_not(vm: &mut VmState) {
    let a = vm.pop();
    vm.push(!a);
}

pub(crate) fn op_byte(vm: &mut VmState) {
    let (index, value) = (vm.pop(), vm.pop());
    let result = match to_u64(index) {
        Some(i) if i < 32 => U256::from(value.to_be_bytes::<32>()[i as usize]),
        _ => U256::ZERO,
    };
    vm.push(result);
}

pub(crate) fn op_shl(vm: &mut VmState) {
    let (shift, value) = (vm.pop(), vm.pop());
    let result = match to_u64(shift) {
        Some(s) if s < 256 => value << (s as usize),
        _ => U256::ZERO,
    };
    vm.push(result);
}

pub(crate) fn op_shr(vm: &mut VmState) {
    let (shift, value) = (vm.pop(), vm.pop());
    let result = match to_u64(shift) {
        Some(s) if s < 256 => value >> (s as usize),
        _ => U256::ZERO,
    };
    vm.push(result);
}

pub(crate) fn op_sar(vm: &mut VmState) {
    let (shift, value) = (vm.pop(), vm.pop());
    let negative = is_neg(value);

    let result = match to_u64(shift) {
        Some(0) => value,
        Some(s) if s < 256 => {
            let shifted = value >> (s as usize);
            if negative {
                shifted | (U256::MAX << (256 - s as usize))
            } else {
                shifted
            }
        }
        _ => {
            if negative {
                U256::MAX
            } else {
                U256::ZERO
            }
        }
    };
    vm.push(result);
}

// hashing

pub(crate) fn op_sha3(vm: &mut VmState) {
    let (offset, size) = (vm.pop(), vm.pop());
    let Some(data) = vm.memory_slice(offset, size) else { return };

    if !vm.consume_gas(SHA3_GAS_PER_WORD * words(data.len() as u64)) {
        return;
    }
    vm.push(U256::from_be_bytes(keccak256(&data).0));
}

// environment

pub(crate) fn op_address(vm: &mut VmState) {
    vm.push(address_word(vm.contract.address));
}

pub(crate) fn op_balance(vm: &mut VmState) {
    let cost = if vm.forks.istanbul {
        700
    } else if vm.forks.eip150 {
        400
    } else {
        20
    };
    if !vm.consume_gas(cost) {
        return;
    }

    let address = to_address(vm.pop());
    let balance = vm.host.get_balance(address);
    vm.push(balance);
}

pub(crate) fn op_origin(vm: &mut VmState) {
    vm.push(address_word(vm.host.get_tx_context().origin));
}

pub(crate) fn op_caller(vm: &mut VmState) {
    vm.push(address_word(vm.contract.caller));
}

pub(crate) fn op_callvalue(vm: &mut VmState) {
    vm.push(vm.contract.value);
}

pub(crate) fn op_calldataload(vm: &mut VmState) {
    let offset = vm.pop();
    let mut word = [0u8; 32];
    if let Some(offset) = to_u64(offset) {
        let input = &vm.contract.input;
        for (i, slot) in word.iter_mut().enumerate() {
            if let Some(byte) = input.get(offset as usize + i) {
                *slot = *byte;
            }
        }
    }
    vm.push(U256::from_be_bytes(word));
}

pub(crate) fn op_calldatasize(vm: &mut VmState) {
    vm.push(U256::from(vm.contract.input.len() as u64));
}

pub(crate) fn op_calldatacopy(vm: &mut VmState) {
    let source = vm.contract.input.clone();
    copy_to_memory(vm, &source);
}

pub(crate) fn op_codesize(vm: &mut VmState) {
    vm.push(U256::from(vm.contract.code.len() as u64));
}

pub(crate) fn op_codecopy(vm: &mut VmState) {
    let source = vm.contract.code.clone();
    copy_to_memory(vm, &source);
}

pub(crate) fn op_gasprice(vm: &mut VmState) {
    vm.push(U256::from_be_bytes(vm.host.get_tx_context().gas_price.0));
}

pub(crate) fn op_extcodesize(vm: &mut VmState) {
    if !vm.consume_gas(if vm.forks.eip150 { 700 } else { 20 }) {
        return;
    }
    let address = to_address(vm.pop());
    let size = vm.host.get_code_size(address);
    vm.push(U256::from(size as u64));
}

pub(crate) fn op_extcodecopy(vm: &mut VmState) {
    if !vm.consume_gas(if vm.forks.eip150 { 700 } else { 20 }) {
        return;
    }
    let address = to_address(vm.pop());
    let source = vm.host.get_code(address);
    copy_to_memory(vm, &source);
}

pub(crate) fn op_returndatasize(vm: &mut VmState) {
    vm.push(U256::from(vm.return_data.len() as u64));
}

pub(crate) fn op_returndatacopy(vm: &mut VmState) {
    let (mem_offset, data_offset, size) = (vm.pop(), vm.pop(), vm.pop());

    let (Some(data_offset), Some(len)) = (to_u64(data_offset), to_u64(size)) else {
        vm.exit(VmError::ReturnDataOutOfBounds);
        return;
    };
    let end = data_offset.checked_add(len);
    match end {
        Some(end) if end <= vm.return_data.len() as u64 => {}
        _ => {
            vm.exit(VmError::ReturnDataOutOfBounds);
            return;
        }
    }

    if !vm.consume_gas(COPY_GAS_PER_WORD * words(len)) {
        return;
    }
    if !vm.extend_memory(mem_offset, size) {
        return;
    }
    if len > 0 {
        let mem_offset = to_u64(mem_offset).expect("checked by extend_memory") as usize;
        let data = vm.return_data[data_offset as usize..(data_offset + len) as usize].to_vec();
        vm.memory[mem_offset..mem_offset + len as usize].copy_from_slice(&data);
    }
}

pub(crate) fn op_extcodehash(vm: &mut VmState) {
    if !vm.consume_gas(if vm.forks.istanbul { 700 } else { 400 }) {
        return;
    }
    let address = to_address(vm.pop());
    if vm.host.empty_account(address) {
        vm.push(U256::ZERO);
    } else {
        let hash = vm.host.get_code_hash(address);
        vm.push(U256::from_be_bytes(hash.0));
    }
}

// block context

pub(crate) fn op_blockhash(vm: &mut VmState) {
    let number = vm.pop();
    let current = vm.host.get_tx_context().number;

    let result = match to_u64(number) {
        Some(n) if n < current && current - n <= 256 => {
            let hash = vm.host.get_block_hash(n);
            U256::from_be_bytes(hash.0)
        }
        _ => U256::ZERO,
    };
    vm.push(result);
}

pub(crate) fn op_coinbase(vm: &mut VmState) {
    vm.push(address_word(vm.host.get_tx_context().coinbase));
}

pub(crate) fn op_timestamp(vm: &mut VmState) {
    vm.push(U256::from(vm.host.get_tx_context().timestamp));
}

pub(crate) fn op_number(vm: &mut VmState) {
    vm.push(U256::from(vm.host.get_tx_context().number));
}

pub(crate) fn op_difficulty(vm: &mut VmState) {
    vm.push(U256::from_be_bytes(vm.host.get_tx_context().difficulty.0));
}

pub(crate) fn op_gaslimit(vm: &mut VmState) {
    vm.push(U256::from(vm.host.get_tx_context().gas_limit));
}

pub(crate) fn op_chainid(vm: &mut VmState) {
    vm.push(U256::from(vm.host.get_tx_context().chain_id));
}

pub(crate) fn op_selfbalance(vm: &mut VmState) {
    let balance = vm.host.get_balance(vm.contract.address);
    vm.push(balance);
}

// stack, memory, storage and flow

pub(crate) fn op_pop(vm: &mut VmState) {
    vm.pop();
}

pub(crate) fn op_mload(vm: &mut VmState) {
    let offset = vm.pop();
    if !vm.extend_memory(offset, U256::from(WORD)) {
        return;
    }
    let offset = to_u64(offset).expect("checked by extend_memory") as usize;
    vm.push(U256::from_be_slice(&vm.memory[offset..offset + 32]));
}

pub(crate) fn op_mstore(vm: &mut VmState) {
    let (offset, value) = (vm.pop(), vm.pop());
    if !vm.extend_memory(offset, U256::from(WORD)) {
        return;
    }
    let offset = to_u64(offset).expect("checked by extend_memory") as usize;
    vm.memory[offset..offset + 32].copy_from_slice(&value.to_be_bytes::<32>());
}

pub(crate) fn op_mstore8(vm: &mut VmState) {
    let (offset, value) = (vm.pop(), vm.pop());
    if !vm.extend_memory(offset, U256::from(1u8)) {
        return;
    }
    let offset = to_u64(offset).expect("checked by extend_memory") as usize;
    vm.memory[offset] = value.to_be_bytes::<32>()[31];
}

pub(crate) fn op_sload(vm: &mut VmState) {
    let cost = if vm.forks.istanbul {
        800
    } else if vm.forks.eip150 {
        200
    } else {
        50
    };
    if !vm.consume_gas(cost) {
        return;
    }

    let key = B256::from(vm.pop().to_be_bytes::<32>());
    let value = vm.host.get_storage(vm.contract.address, key);
    vm.push(U256::from_be_bytes(value.0));
}

pub(crate) fn op_sstore(vm: &mut VmState) {
    if vm.in_static_call() {
        vm.exit(VmError::WriteProtection);
        return;
    }
    // EIP-2200 sentry
    if vm.forks.istanbul && vm.gas <= CALL_STIPEND {
        vm.exit(VmError::OutOfGas);
        return;
    }

    let key = B256::from(vm.pop().to_be_bytes::<32>());
    let value = B256::from(vm.pop().to_be_bytes::<32>());

    let forks = *vm.forks;
    let status = vm.host.set_storage(vm.contract.address, key, value, &forks);

    // refunds are accounted by the state layer; only the direct cost is
    // charged here
    let legacy_metering =
        !vm.forks.istanbul && (vm.forks.petersburg || !vm.forks.constantinople);
    let cost = match status {
        StorageStatus::Added => 20_000,
        StorageStatus::Modified | StorageStatus::Deleted => 5_000,
        // dirty-slot writes and no-ops settle at the warm cost
        StorageStatus::Unchanged
        | StorageStatus::ModifiedAgain
        | StorageStatus::DeletedAdded
        | StorageStatus::AddedDeleted
        | StorageStatus::ModifiedRestored => {
            if vm.forks.istanbul {
                800
            } else if legacy_metering {
                5_000
            } else {
                200
            }
        }
    };
    vm.consume_gas(cost);
}

pub(crate) fn op_jump(vm: &mut VmState) {
    let dest = vm.pop();
    match to_u64(dest) {
        Some(dest) if vm.bitmap.is_set(dest as usize) => {
            vm.ip = dest as usize;
            vm.jumped = true;
        }
        _ => vm.exit(VmError::InvalidJump),
    }
}

pub(crate) fn op_jumpi(vm: &mut VmState) {
    let (dest, condition) = (vm.pop(), vm.pop());
    if condition.is_zero() {
        return;
    }
    match to_u64(dest) {
        Some(dest) if vm.bitmap.is_set(dest as usize) => {
            vm.ip = dest as usize;
            vm.jumped = true;
        }
        _ => vm.exit(VmError::InvalidJump),
    }
}

pub(crate) fn op_pc(vm: &mut VmState) {
    vm.push(U256::from(vm.ip as u64));
}

pub(crate) fn op_msize(vm: &mut VmState) {
    vm.push(U256::from(vm.memory.len() as u64));
}

pub(crate) fn op_gas(vm: &mut VmState) {
    vm.push(U256::from(vm.gas));
}

pub(crate) fn op_jumpdest(_vm: &mut VmState) {}

// push, dup, swap: one handler each, the width comes from the opcode

pub(crate) fn op_push(vm: &mut VmState) {
    let n = (vm.contract.code[vm.ip] - 0x60 + 1) as usize;
    let mut word = [0u8; 32];
    for i in 0..n {
        if let Some(byte) = vm.contract.code.get(vm.ip + 1 + i) {
            word[32 - n + i] = *byte;
        }
    }
    vm.push(U256::from_be_bytes(word));
    vm.ip += n;
}

pub(crate) fn op_dup(vm: &mut VmState) {
    let n = (vm.contract.code[vm.ip] - 0x80 + 1) as usize;
    vm.push(vm.peek_at(n));
}

pub(crate) fn op_swap(vm: &mut VmState) {
    let n = (vm.contract.code[vm.ip] - 0x90 + 1) as usize;
    vm.swap(n);
}

// logging

pub(crate) fn op_log(vm: &mut VmState) {
    if vm.in_static_call() {
        vm.exit(VmError::WriteProtection);
        return;
    }

    let topic_count = (vm.contract.code[vm.ip] - 0xa0) as usize;
    let (offset, size) = (vm.pop(), vm.pop());

    let mut topics = Vec::with_capacity(topic_count);
    for _ in 0..topic_count {
        topics.push(B256::from(vm.pop().to_be_bytes::<32>()));
    }

    let Some(data) = vm.memory_slice(offset, size) else { return };
    let cost = LOG_TOPIC_GAS * topic_count as u64 + LOG_DATA_GAS * data.len() as u64;
    if !vm.consume_gas(cost) {
        return;
    }

    let address = vm.contract.address;
    vm.host.emit_log(address, topics, data);
}

// halting

pub(crate) fn op_stop(vm: &mut VmState) {
    vm.halt();
}

pub(crate) fn op_return(vm: &mut VmState) {
    let (offset, size) = (vm.pop(), vm.pop());
    if let Some(data) = vm.memory_slice(offset, size) {
        vm.ret = data;
        vm.halt();
    }
}

pub(crate) fn op_revert(vm: &mut VmState) {
    let (offset, size) = (vm.pop(), vm.pop());
    if let Some(data) = vm.memory_slice(offset, size) {
        vm.ret = data;
        vm.exit(VmError::Revert);
    }
}

pub(crate) fn op_selfdestruct(vm: &mut VmState) {
    if vm.in_static_call() {
        vm.exit(VmError::WriteProtection);
        return;
    }

    let beneficiary = to_address(vm.pop());
    let address = vm.contract.address;

    let mut cost = if vm.forks.eip150 { 5_000 } else { 0 };
    if vm.forks.eip158 {
        let balance = vm.host.get_balance(address);
        if !balance.is_zero() && vm.host.empty_account(beneficiary) {
            cost += NEW_ACCOUNT_GAS;
        }
    } else if vm.forks.eip150 && !vm.host.account_exists(beneficiary) {
        cost += NEW_ACCOUNT_GAS;
    }
    if !vm.consume_gas(cost) {
        return;
    }

    vm.host.selfdestruct(address, beneficiary);
    vm.halt();
}

// calls and creates

pub(crate) fn op_call(vm: &mut VmState) {
    let call_type = match vm.contract.code[vm.ip] {
        0xf1 => CallType::Call,
        0xf2 => CallType::CallCode,
        0xf4 => CallType::DelegateCall,
        _ => CallType::StaticCall,
    };

    let requested = vm.pop();
    let to = to_address(vm.pop());
    let value = match call_type {
        CallType::Call | CallType::CallCode => vm.pop(),
        _ => U256::ZERO,
    };
    let (in_offset, in_size) = (vm.pop(), vm.pop());
    let (out_offset, out_size) = (vm.pop(), vm.pop());

    if call_type == CallType::Call && vm.in_static_call() && !value.is_zero() {
        vm.exit(VmError::WriteProtection);
        return;
    }

    let Some(input) = vm.memory_slice(in_offset, in_size) else { return };
    if !vm.extend_memory(out_offset, out_size) {
        return;
    }

    let mut base_cost = if vm.forks.eip150 { 700 } else { 40 };
    if call_type == CallType::Call {
        if !value.is_zero() {
            base_cost += CALL_VALUE_GAS;
        }
        let needs_new_account = if vm.forks.eip158 {
            !value.is_zero() && vm.host.empty_account(to)
        } else {
            !vm.host.account_exists(to)
        };
        if needs_new_account {
            base_cost += NEW_ACCOUNT_GAS;
        }
    }
    if !vm.consume_gas(base_cost) {
        return;
    }

    // EIP-150: forward at most all-but-one-64th
    let mut gas_limit = if vm.forks.eip150 {
        let available = vm.gas - vm.gas / 64;
        match to_u64(requested) {
            Some(requested) if requested < available => requested,
            _ => available,
        }
    } else {
        match to_u64(requested) {
            Some(requested) if requested <= vm.gas => requested,
            _ => {
                vm.exit(VmError::OutOfGas);
                return;
            }
        }
    };
    if !vm.consume_gas(gas_limit) {
        return;
    }
    if !value.is_zero() {
        gas_limit += CALL_STIPEND;
    }

    let code = vm.host.get_code(to);
    let mut contract = match call_type {
        CallType::DelegateCall => Contract {
            call_type,
            depth: vm.contract.depth + 1,
            address: vm.contract.address,
            code_address: to,
            caller: vm.contract.caller,
            value: vm.contract.value,
            gas: gas_limit,
            code,
            input,
            is_static: false,
        },
        CallType::CallCode => Contract {
            call_type,
            depth: vm.contract.depth + 1,
            address: vm.contract.address,
            code_address: to,
            caller: vm.contract.address,
            value,
            gas: gas_limit,
            code,
            input,
            is_static: false,
        },
        _ => Contract {
            call_type,
            depth: vm.contract.depth + 1,
            address: to,
            code_address: to,
            caller: vm.contract.address,
            value,
            gas: gas_limit,
            code,
            input,
            is_static: false,
        },
    };
    // a static frame taints every nested frame
    contract.is_static = vm.in_static_call() || call_type == CallType::StaticCall;

    let result = vm.host.callx(contract);

    vm.push(bool_word(!result.failed()));

    if !result.failed() || result.reverted() {
        let copy_len = (result.return_value.len() as u64).min(
            to_u64(out_size).unwrap_or(0),
        );
        if copy_len > 0 {
            let out_offset = to_u64(out_offset).expect("checked by extend_memory") as usize;
            vm.memory[out_offset..out_offset + copy_len as usize]
                .copy_from_slice(&result.return_value[..copy_len as usize]);
        }
    }

    vm.return_data = result.return_value;
    vm.gas += result.gas_left;
}

pub(crate) fn op_create(vm: &mut VmState) {
    if vm.in_static_call() {
        vm.exit(VmError::WriteProtection);
        return;
    }

    let create2 = vm.contract.code[vm.ip] == 0xf5;
    let value = vm.pop();
    let (offset, size) = (vm.pop(), vm.pop());
    let salt = if create2 { vm.pop() } else { U256::ZERO };

    let Some(init_code) = vm.memory_slice(offset, size) else { return };
    if create2 && !vm.consume_gas(SHA3_GAS_PER_WORD * words(init_code.len() as u64)) {
        return;
    }

    if vm.contract.depth >= MAX_CALL_DEPTH {
        vm.exit(VmError::Depth);
        return;
    }

    let gas_limit = if vm.forks.eip150 { vm.gas - vm.gas / 64 } else { vm.gas };
    if !vm.consume_gas(gas_limit) {
        return;
    }

    let sender = vm.contract.address;
    let address = if create2 {
        crypto::create2_address(
            sender,
            B256::from(salt.to_be_bytes::<32>()),
            keccak256(&init_code),
        )
    } else {
        crypto::create_address(sender, vm.host.get_nonce(sender))
    };

    let contract = Contract::new_creation(
        if create2 { CallType::Create2 } else { CallType::Create },
        vm.contract.depth + 1,
        sender,
        address,
        value,
        gas_limit,
        init_code,
    );

    let result = vm.host.callx(contract);

    if result.reverted() {
        vm.return_data = result.return_value.clone();
    } else {
        vm.return_data.clear();
    }

    if result.failed() {
        vm.push(U256::ZERO);
    } else {
        vm.push(address_word(result.created.unwrap_or(address)));
    }
    vm.gas += result.gas_left;
}

/// `(mem_offset, data_offset, size)` copy with word-gas and zero padding.
fn copy_to_memory(vm: &mut VmState, source: &[u8]) {
    let (mem_offset, data_offset, size) = (vm.pop(), vm.pop(), vm.pop());

    let Some(len) = to_u64(size) else {
        vm.exit(VmError::GasOverflow);
        return;
    };
    if !vm.consume_gas(COPY_GAS_PER_WORD * words(len)) {
        return;
    }
    if len == 0 {
        return;
    }
    if !vm.extend_memory(mem_offset, size) {
        return;
    }

    let mem_offset = to_u64(mem_offset).expect("checked by extend_memory") as usize;
    let start = to_u64(data_offset).unwrap_or(u64::MAX).min(source.len() as u64) as usize;
    let available = source.len() - start;
    let copy = (len as usize).min(available);

    vm.memory[mem_offset..mem_offset + copy].copy_from_slice(&source[start..start + copy]);
    for slot in &mut vm.memory[mem_offset + copy..mem_offset + len as usize] {
        *slot = 0;
    }
}
