use crate::{Contract, ScopeContext, VmError};
use dogesync_chainspec::ForksInTime;
use dogesync_primitives::{Address, B256, U256};

/// Block and transaction environment a frame executes in.
#[derive(Clone, Copy, Debug, Default)]
pub struct TxContext {
    pub coinbase: Address,
    pub origin: Address,
    pub gas_price: B256,
    pub timestamp: u64,
    pub number: u64,
    pub difficulty: B256,
    pub gas_limit: u64,
    pub chain_id: u64,
}

/// The effect of an `SSTORE`, driving EIP-2200 gas accounting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageStatus {
    Unchanged,
    Modified,
    Added,
    Deleted,
    DeletedAdded,
    AddedDeleted,
    ModifiedAgain,
    ModifiedRestored,
}

/// Output of one execution frame.
#[derive(Clone, Debug, Default)]
pub struct ExecutionResult {
    pub return_value: Vec<u8>,
    pub gas_left: u64,
    pub gas_used: u64,
    pub err: Option<VmError>,
    /// Address of the created contract, for creation frames.
    pub created: Option<Address>,
}

impl ExecutionResult {
    pub fn failed(&self) -> bool {
        self.err.is_some()
    }

    pub fn reverted(&self) -> bool {
        self.err == Some(VmError::Revert)
    }

    pub fn error(err: VmError, gas_left: u64) -> Self {
        Self { gas_left, ..Default::default() }.with_err(err)
    }

    fn with_err(mut self, err: VmError) -> Self {
        self.err = Some(err);
        self
    }

    /// Settles the frame against the purchased gas: computes `gas_used` and
    /// applies the refund, capped at half of the gas actually used.
    pub fn update_gas_used(&mut self, gas_limit: u64, refund: u64) {
        let used = gas_limit - self.gas_left;
        let refund = refund.min(used / 2);

        self.gas_left += refund;
        self.gas_used = used - refund;
    }
}

/// Everything a frame needs from the world outside its own stack and
/// memory. Implemented by the state transition.
///
/// The `capture_*` hooks forward to the attached tracer; the default
/// implementations are no-ops so an untraced run pays nothing.
pub trait Host {
    fn account_exists(&mut self, address: Address) -> bool;
    fn empty_account(&mut self, address: Address) -> bool;

    fn get_nonce(&mut self, address: Address) -> u64;
    fn get_balance(&mut self, address: Address) -> U256;
    fn get_code(&mut self, address: Address) -> Vec<u8>;
    fn get_code_size(&mut self, address: Address) -> usize;
    fn get_code_hash(&mut self, address: Address) -> B256;

    fn get_storage(&mut self, address: Address, key: B256) -> B256;
    fn set_storage(
        &mut self,
        address: Address,
        key: B256,
        value: B256,
        forks: &ForksInTime,
    ) -> StorageStatus;

    fn add_refund(&mut self, gas: u64);
    fn refund(&mut self) -> u64;

    fn selfdestruct(&mut self, address: Address, beneficiary: Address);
    fn has_suicided(&mut self, address: Address) -> bool;

    fn emit_log(&mut self, address: Address, topics: Vec<B256>, data: Vec<u8>);

    fn get_tx_context(&self) -> TxContext;
    fn get_block_hash(&mut self, number: u64) -> B256;

    /// Runs a nested frame (call or create) and returns its result.
    fn callx(&mut self, contract: Contract) -> ExecutionResult;

    // tracing hooks

    fn tracing_enabled(&self) -> bool {
        false
    }

    fn capture_state(
        &mut self,
        _scope: &ScopeContext,
        _ip: usize,
        _op: u8,
        _gas: u64,
        _gas_cost: u64,
    ) {
    }

    fn capture_fault(
        &mut self,
        _scope: &ScopeContext,
        _ip: usize,
        _op: u8,
        _gas: u64,
        _gas_cost: u64,
        _err: &VmError,
    ) {
    }
}
