//! The opcode dispatch table: one `(handler, base gas, stack arity)` triple
//! per byte. Bytes without an entry raise `OpCodeNotFound`.

use crate::{instructions as ins, interpreter::VmState};
use std::sync::LazyLock;

pub(crate) type OpFn = for<'a, 'b> fn(&'a mut VmState<'b>);

pub(crate) struct Instruction {
    pub exec: OpFn,
    /// Base gas, charged before the handler runs. Fork- and size-dependent
    /// costs are charged inside the handler.
    pub gas: u64,
    /// Minimum stack depth the handler requires.
    pub stack: usize,
}

pub(crate) fn dispatch_table() -> &'static [Option<Instruction>; 256] {
    static TABLE: LazyLock<[Option<Instruction>; 256]> = LazyLock::new(build_table);
    &TABLE
}

fn build_table() -> [Option<Instruction>; 256] {
    let mut table: [Option<Instruction>; 256] = [const { None }; 256];

    let mut set = |op: u8, gas: u64, stack: usize, exec: OpFn| {
        table[op as usize] = Some(Instruction { exec, gas, stack });
    };

    set(0x00, 0, 0, ins::op_stop);
    set(0x01, 3, 2, ins::op_add);
    set(0x02, 5, 2, ins::op_mul);
    set(0x03, 3, 2, ins::op_sub);
    set(0x04, 5, 2, ins::op_div);
    set(0x05, 5, 2, ins::op_sdiv);
    set(0x06, 5, 2, ins::op_mod);
    set(0x07, 5, 2, ins::op_smod);
    set(0x08, 8, 3, ins::op_addmod);
    set(0x09, 8, 3, ins::op_mulmod);
    set(0x0a, 10, 2, ins::op_exp);
    set(0x0b, 5, 2, ins::op_signextend);

    set(0x10, 3, 2, ins::op_lt);
    set(0x11, 3, 2, ins::op_gt);
    set(0x12, 3, 2, ins::op_slt);
    set(0x13, 3, 2, ins::op_sgt);
    set(0x14, 3, 2, ins::op_eq);
    set(0x15, 3, 1, ins::op_iszero);
    set(0x16, 3, 2, ins::op_and);
    set(0x17, 3, 2, ins::op_or);
    set(0x18, 3, 2, ins::op_xor);
    set(0x19, 3, 1, ins::op_not);
    set(0x1a, 3, 2, ins::op_byte);
    set(0x1b, 3, 2, ins::op_shl);
    set(0x1c, 3, 2, ins::op_shr);
    set(0x1d, 3, 2, ins::op_sar);

    set(0x20, 30, 2, ins::op_sha3);

    set(0x30, 2, 0, ins::op_address);
    set(0x31, 0, 1, ins::op_balance);
    set(0x32, 2, 0, ins::op_origin);
    set(0x33, 2, 0, ins::op_caller);
    set(0x34, 2, 0, ins::op_callvalue);
    set(0x35, 3, 1, ins::op_calldataload);
    set(0x36, 2, 0, ins::op_calldatasize);
    set(0x37, 3, 3, ins::op_calldatacopy);
    set(0x38, 2, 0, ins::op_codesize);
    set(0x39, 3, 3, ins::op_codecopy);
    set(0x3a, 2, 0, ins::op_gasprice);
    set(0x3b, 0, 1, ins::op_extcodesize);
    set(0x3c, 0, 4, ins::op_extcodecopy);
    set(0x3d, 2, 0, ins::op_returndatasize);
    set(0x3e, 3, 3, ins::op_returndatacopy);
    set(0x3f, 0, 1, ins::op_extcodehash);

    set(0x40, 20, 1, ins::op_blockhash);
    set(0x41, 2, 0, ins::op_coinbase);
    set(0x42, 2, 0, ins::op_timestamp);
    set(0x43, 2, 0, ins::op_number);
    set(0x44, 2, 0, ins::op_difficulty);
    set(0x45, 2, 0, ins::op_gaslimit);
    set(0x46, 2, 0, ins::op_chainid);
    set(0x47, 5, 0, ins::op_selfbalance);

    set(0x50, 2, 1, ins::op_pop);
    set(0x51, 3, 1, ins::op_mload);
    set(0x52, 3, 2, ins::op_mstore);
    set(0x53, 3, 2, ins::op_mstore8);
    set(0x54, 0, 1, ins::op_sload);
    set(0x55, 0, 2, ins::op_sstore);
    set(0x56, 8, 1, ins::op_jump);
    set(0x57, 10, 2, ins::op_jumpi);
    set(0x58, 2, 0, ins::op_pc);
    set(0x59, 2, 0, ins::op_msize);
    set(0x5a, 2, 0, ins::op_gas);
    set(0x5b, 1, 0, ins::op_jumpdest);

    for op in 0x60..=0x7f {
        set(op, 3, 0, ins::op_push);
    }
    for (i, op) in (0x80..=0x8f).enumerate() {
        set(op, 3, i + 1, ins::op_dup);
    }
    for (i, op) in (0x90..=0x9f).enumerate() {
        set(op, 3, i + 2, ins::op_swap);
    }
    for (i, op) in (0xa0..=0xa4).enumerate() {
        set(op, 375, i + 2, ins::op_log);
    }

    set(0xf0, 32_000, 3, ins::op_create);
    set(0xf1, 0, 7, ins::op_call);
    set(0xf2, 0, 7, ins::op_call);
    set(0xf3, 0, 2, ins::op_return);
    set(0xf4, 0, 6, ins::op_call);
    set(0xf5, 32_000, 4, ins::op_create);
    set(0xfa, 0, 6, ins::op_call);
    set(0xfd, 0, 2, ins::op_revert);
    set(0xff, 0, 1, ins::op_selfdestruct);

    table
}
