use crate::{
    bitmap::JumpDestBitmap,
    dispatch::dispatch_table,
    Contract, ExecutionResult, Host, Runtime, ScopeContext, VmError,
};
use dogesync_chainspec::ForksInTime;
use dogesync_primitives::U256;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub(crate) const STACK_SIZE: usize = 1024;
pub(crate) const MAX_CALL_DEPTH: usize = 1024;

/// The EVM bytecode runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct Evm;

impl Runtime for Evm {
    fn can_run(&self, _contract: &Contract, _host: &mut dyn Host, _forks: &ForksInTime) -> bool {
        true
    }

    fn run(
        &self,
        contract: &Contract,
        host: &mut dyn Host,
        forks: &ForksInTime,
    ) -> ExecutionResult {
        execute(contract, host, forks)
    }

    fn name(&self) -> &str {
        "evm"
    }
}

/// Runs one frame to completion.
pub(crate) fn execute(
    contract: &Contract,
    host: &mut dyn Host,
    forks: &ForksInTime,
) -> ExecutionResult {
    let mut vm = VmState {
        ip: 0,
        jumped: false,
        contract,
        host,
        forks,
        memory: Vec::new(),
        last_gas_cost: 0,
        stack: Vec::with_capacity(64),
        gas: contract.gas,
        bitmap: JumpDestBitmap::analyze(&contract.code),
        return_data: Vec::new(),
        ret: Vec::new(),
        stop: false,
        err: None,
    };

    // low-level panics become structured errors carrying the machine state,
    // consensus code must not crash on attacker-controlled bytecode
    if catch_unwind(AssertUnwindSafe(|| vm.run())).is_err() {
        vm.err = Some(VmError::Panic(vm.describe_state()));
    }

    match vm.err {
        None => ExecutionResult {
            return_value: vm.ret,
            gas_left: vm.gas,
            ..Default::default()
        },
        Some(VmError::Revert) => ExecutionResult {
            return_value: vm.ret,
            gas_left: vm.gas,
            err: Some(VmError::Revert),
            ..Default::default()
        },
        // anything but a revert consumes the frame's remaining gas
        Some(err) => ExecutionResult { gas_left: 0, err: Some(err), ..Default::default() },
    }
}

/// One frame's machine state.
pub(crate) struct VmState<'a> {
    pub ip: usize,
    pub jumped: bool,
    pub contract: &'a Contract,
    pub host: &'a mut dyn Host,
    pub forks: &'a ForksInTime,

    /// Memory grows in 32-byte words; `last_gas_cost` caches the cumulative
    /// expansion charge so only the increment is billed.
    pub memory: Vec<u8>,
    pub last_gas_cost: u64,

    pub stack: Vec<U256>,
    pub gas: u64,
    pub bitmap: JumpDestBitmap,

    pub return_data: Vec<u8>,
    pub ret: Vec<u8>,
    pub stop: bool,
    pub err: Option<VmError>,
}

impl VmState<'_> {
    fn run(&mut self) {
        let table = dispatch_table();
        let tracing = self.host.tracing_enabled();

        while !self.stop {
            if self.ip >= self.contract.code.len() {
                self.halt();
                break;
            }

            let op = self.contract.code[self.ip];
            let Some(inst) = &table[op as usize] else {
                self.exit(VmError::OpCodeNotFound);
                break;
            };

            if self.stack.len() < inst.stack {
                self.exit(VmError::StackUnderflow);
                break;
            }
            if !self.consume_gas(inst.gas) {
                break;
            }

            let (ip_before, gas_before) = (self.ip, self.gas + inst.gas);
            let scope = tracing.then(|| self.scope());

            (inst.exec)(self);

            if let Some(scope) = scope {
                let cost = gas_before - self.gas;
                match &self.err {
                    Some(err) if *err != VmError::Revert => {
                        let err = err.clone();
                        self.host.capture_fault(&scope, ip_before, op, gas_before, cost, &err);
                    }
                    _ => self.host.capture_state(&scope, ip_before, op, gas_before, cost),
                }
            }

            if self.stack.len() > STACK_SIZE {
                self.exit(VmError::StackOverflow);
                break;
            }

            if self.jumped {
                self.jumped = false;
            } else {
                self.ip += 1;
            }
        }
    }

    fn scope(&self) -> ScopeContext {
        ScopeContext {
            memory: self.memory.clone(),
            stack: self.stack.clone(),
            contract_address: self.contract.address,
            depth: self.contract.depth,
        }
    }

    /// Human-readable machine state for the panic post-mortem.
    pub(crate) fn describe_state(&self) -> String {
        let stack: Vec<String> = self.stack.iter().map(|v| format!("{v:#x}")).collect();
        format!(
            "contract: {:?}, ip: {}, sp: {}, stack: [{}], memory: 0x{}, ret: 0x{}, return_data: 0x{}",
            self.contract.address,
            self.ip,
            self.stack.len(),
            stack.join(","),
            hex(&self.memory),
            hex(&self.ret),
            hex(&self.return_data),
        )
    }

    pub(crate) fn halt(&mut self) {
        self.stop = true;
    }

    pub(crate) fn exit(&mut self, err: VmError) {
        self.stop = true;
        self.err = Some(err);
    }

    pub(crate) fn consume_gas(&mut self, gas: u64) -> bool {
        if self.gas < gas {
            self.exit(VmError::OutOfGas);
            return false;
        }
        self.gas -= gas;
        true
    }

    pub(crate) fn push(&mut self, value: U256) {
        self.stack.push(value);
    }

    pub(crate) fn pop(&mut self) -> U256 {
        self.stack.pop().expect("stack arity checked by dispatch")
    }

    pub(crate) fn peek_at(&self, n: usize) -> U256 {
        self.stack[self.stack.len() - n]
    }

    pub(crate) fn swap(&mut self, n: usize) {
        let top = self.stack.len() - 1;
        self.stack.swap(top, top - n);
    }

    pub(crate) fn in_static_call(&self) -> bool {
        self.contract.is_static
    }

    /// Charges for and performs memory expansion to cover
    /// `[offset, offset+size)`. The cumulative quadratic cost is cached so
    /// each expansion only bills the increment.
    pub(crate) fn extend_memory(&mut self, offset: U256, size: U256) -> bool {
        let (Ok(offset), Ok(size)) = (u64::try_from(offset), u64::try_from(size)) else {
            self.exit(VmError::GasOverflow);
            return false;
        };
        if size == 0 {
            return true;
        }
        if offset > 0xffffffffe0 || size > 0xffffffffe0 {
            self.exit(VmError::GasOverflow);
            return false;
        }

        let new_size = offset + size;
        if (self.memory.len() as u64) < new_size {
            let words = (new_size + 31) / 32;
            let new_cost = 3 * words + words * words / 512;
            let cost = new_cost - self.last_gas_cost;
            self.last_gas_cost = new_cost;

            if !self.consume_gas(cost) {
                return false;
            }
            self.memory.resize((words * 32) as usize, 0);
        }
        true
    }

    /// Extends memory and copies out `[offset, offset+size)`.
    pub(crate) fn memory_slice(&mut self, offset: U256, size: U256) -> Option<Vec<u8>> {
        if size.is_zero() {
            return Some(Vec::new());
        }
        if !self.extend_memory(offset, size) {
            return None;
        }

        let offset = u64::try_from(offset).expect("checked by extend_memory") as usize;
        let size = u64::try_from(size).expect("checked by extend_memory") as usize;
        Some(self.memory[offset..offset + size].to_vec())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
