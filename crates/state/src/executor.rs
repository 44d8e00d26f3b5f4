use crate::{
    errors::ExecError, txn::Txn, SPURIOUS_DRAGON_MAX_CODE_SIZE, TX_GAS, TX_GAS_CONTRACT_CREATION,
};
use dogesync_chainspec::{ContractUpgrade, ForksInTime, GenesisAccount, Params};
use dogesync_contracts::{bridge, VAULT_CONTRACT};
use dogesync_evm::{
    CallType, Contract, Evm, ExecutionResult, Host, NoopTracer, Runtime, ScopeContext,
    StorageStatus, Tracer, TxContext, VmError,
};
use dogesync_primitives::{
    crypto::{self, TxSigner},
    logs_bloom, Address, Header, Receipt, ReceiptStatus, Transaction, B256, U256,
};
use dogesync_trie::{State, Trie};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
};
use tracing::{debug, info};

const MAX_CALL_DEPTH: usize = 1024;
const CODE_DEPOSIT_GAS_PER_BYTE: u64 = 200;
const SELFDESTRUCT_REFUND: u64 = 24_000;

/// Resolves a block number to its canonical hash, for `BLOCKHASH`.
pub type GetHashByNumber = Arc<dyn Fn(u64) -> B256 + Send + Sync>;

/// Builds a [`GetHashByNumber`] anchored at a given header.
pub type GetHashHelper = Box<dyn Fn(&Header) -> GetHashByNumber + Send + Sync>;

/// Applies transactions to state snapshots.
pub struct Executor {
    chain_id: u64,
    forks: dogesync_chainspec::Forks,
    upgrades: Vec<ContractUpgrade>,
    state: Arc<State>,
    runtimes: Arc<Vec<Box<dyn Runtime>>>,
    get_hash: OnceLock<GetHashHelper>,
    stopped: AtomicBool,
}

impl Executor {
    pub fn new(params: &Params, state: Arc<State>) -> Self {
        let runtimes: Vec<Box<dyn Runtime>> = vec![Box::new(Evm)];
        Self {
            chain_id: params.chain_id,
            forks: params.forks.clone(),
            upgrades: params.upgrades.clone(),
            state,
            runtimes: Arc::new(runtimes),
            get_hash: OnceLock::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Adds a runtime (e.g. the precompile table) ahead of the EVM. Only
    /// valid while the executor is still being assembled.
    pub fn with_runtime(mut self, runtime: Box<dyn Runtime>) -> Self {
        let runtimes = Arc::get_mut(&mut self.runtimes).expect("executor not shared yet");
        runtimes.insert(0, runtime);
        self
    }

    /// Wires the `BLOCKHASH` ancestor walk; set once by the blockchain.
    pub fn set_get_hash(&self, helper: GetHashHelper) {
        let _ = self.get_hash.set(helper);
    }

    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    pub fn forks_at(&self, number: u64) -> ForksInTime {
        self.forks.at(number)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Executes the genesis allocation into the empty trie and returns the
    /// genesis state root.
    pub fn write_genesis(
        &self,
        alloc: &BTreeMap<Address, GenesisAccount>,
    ) -> Result<B256, ExecError> {
        let snapshot = self.state.new_snapshot();
        let mut txn = Txn::new(Arc::clone(&self.state), snapshot.clone());

        for (address, account) in alloc {
            if !account.balance.is_zero() {
                txn.add_balance(*address, account.balance);
            }
            if account.nonce != 0 {
                txn.set_nonce(*address, account.nonce);
            }
            if !account.code.is_empty() {
                txn.set_code(*address, &account.code);
            }
            for (key, value) in &account.storage {
                txn.set_state(*address, *key, *value);
            }
        }

        let objects = txn.commit(false);
        let (_, root) = snapshot.commit(&self.state, &objects)?;

        info!(target: "executor", %root, accounts = alloc.len(), "genesis state written");
        Ok(root)
    }

    /// Prepares a block-level transition on top of `parent_root`.
    pub fn begin_txn(
        &self,
        parent_root: B256,
        header: &Header,
        coinbase: Address,
    ) -> Result<Transition, ExecError> {
        let forks = self.forks.at(header.number);
        let snapshot = self.state.new_snapshot_at(parent_root)?;

        let ctx = TxContext {
            coinbase,
            origin: Address::ZERO,
            gas_price: B256::ZERO,
            timestamp: header.timestamp,
            number: header.number,
            difficulty: B256::from(U256::from(header.difficulty).to_be_bytes::<32>()),
            gas_limit: header.gas_limit,
            chain_id: self.chain_id,
        };

        let get_hash = match self.get_hash.get() {
            Some(helper) => helper(header),
            None => Arc::new(|_| B256::ZERO) as GetHashByNumber,
        };

        Ok(Transition {
            chain_id: self.chain_id,
            forks,
            state: Arc::clone(&self.state),
            txn: Txn::new(Arc::clone(&self.state), snapshot),
            ctx,
            get_hash,
            gas_pool: header.gas_limit,
            receipts: Vec::new(),
            total_gas: 0,
            runtimes: Arc::clone(&self.runtimes),
            tracer: Box::new(NoopTracer),
            tracing: false,
        })
    }

    /// Applies a batch of transactions, writing a failed receipt for any
    /// transaction that alone exceeds the block gas limit.
    pub fn process_transactions(
        &self,
        transition: &mut Transition,
        gas_limit: u64,
        transactions: &[Transaction],
    ) -> Result<(), ExecError> {
        for tx in transactions {
            if self.is_stopped() {
                return Err(ExecError::ExecutionStop);
            }

            if tx.exceeds_block_gas_limit(gas_limit) {
                transition.write_failed_receipt(tx)?;
                continue;
            }

            transition.write(tx)?;
        }
        Ok(())
    }

    /// Replaces system-contract code at fork activation heights, the only
    /// write the executor performs without a transaction.
    pub fn upgrade_system(&self, transition: &mut Transition, number: u64) {
        for upgrade in &self.upgrades {
            if upgrade.block == number {
                info!(target: "executor", address = %upgrade.address, number, "upgrading system contract");
                transition.txn.set_code(upgrade.address, &upgrade.code);
            }
        }
    }
}

/// A block-level transactional overlay: applies transactions one by one,
/// accumulates receipts and commits a new state root.
pub struct Transition {
    chain_id: u64,
    forks: ForksInTime,
    state: Arc<State>,
    txn: Txn,
    ctx: TxContext,
    get_hash: GetHashByNumber,
    gas_pool: u64,

    receipts: Vec<Receipt>,
    total_gas: u64,

    runtimes: Arc<Vec<Box<dyn Runtime>>>,
    tracer: Box<dyn Tracer>,
    tracing: bool,
}

impl Transition {
    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    pub fn total_gas(&self) -> u64 {
        self.total_gas
    }

    pub fn txn_mut(&mut self) -> &mut Txn {
        &mut self.txn
    }

    /// Attaches a tracer; pass [`NoopTracer`] to turn tracing back off.
    pub fn set_tracer(&mut self, tracer: Box<dyn Tracer>, enabled: bool) {
        self.tracer = tracer;
        self.tracing = enabled;
    }

    fn signer(&self) -> TxSigner {
        TxSigner::new(self.chain_id, self.forks.eip155)
    }

    /// Records a failed receipt for a transaction that cannot be applied
    /// (block gas limit exceeded).
    pub fn write_failed_receipt(&mut self, tx: &Transaction) -> Result<(), ExecError> {
        let from = self.signer().sender(tx)?;

        let mut receipt = Receipt {
            cumulative_gas_used: self.total_gas,
            tx_hash: tx.hash(),
            logs: self.txn.take_logs(),
            ..Default::default()
        };
        receipt.set_status(ReceiptStatus::Failed);
        receipt.logs_bloom = logs_bloom(&receipt.logs);
        if tx.is_contract_creation() {
            receipt.contract_address = Some(crypto::create_address(from, tx.nonce));
        }

        self.receipts.push(receipt);
        Ok(())
    }

    /// Applies one transaction and appends its receipt. Any error rejects
    /// the block.
    pub fn write(&mut self, tx: &Transaction) -> Result<(), ExecError> {
        let from = self.signer().sender(tx)?;

        let checkpoint = self.txn.checkpoint();
        let result = match self.apply(tx, from) {
            Ok(result) => result,
            Err(err) => {
                self.txn.revert_to_checkpoint(checkpoint);
                debug!(target: "executor", hash = %tx.hash(), %err, "failed to apply tx");
                return Err(err);
            }
        };

        self.total_gas += result.gas_used;
        let logs = self.txn.take_logs();

        let mut receipt = Receipt {
            cumulative_gas_used: self.total_gas,
            tx_hash: tx.hash(),
            gas_used: result.gas_used,
            ..Default::default()
        };

        if self.forks.byzantium {
            // suicided accounts are deleted for the next transaction
            self.txn.clean_delete_objects(true);
            receipt.set_status(if result.failed() {
                ReceiptStatus::Failed
            } else {
                ReceiptStatus::Success
            });
        } else {
            let objects = self.txn.commit(self.forks.eip155);
            let (snapshot, root) = self.txn.snapshot_trie().commit(&self.state, &objects)?;
            self.txn = Txn::new(Arc::clone(&self.state), snapshot);
            receipt.root = Some(root);
        }

        if tx.is_contract_creation() {
            receipt.contract_address = Some(crypto::create_address(from, tx.nonce));
        }

        // cross-chain bridge events adjust balances outside the EVM; their
        // failure rejects the block
        self.handle_bridge_logs(tx, &logs)?;

        receipt.logs = logs;
        receipt.logs_bloom = logs_bloom(&receipt.logs);
        self.receipts.push(receipt);

        Ok(())
    }

    /// Consensus checks and the topmost call, in order.
    fn apply(&mut self, tx: &Transaction, from: Address) -> Result<ExecutionResult, ExecError> {
        // 0. the pool must still cover the base transaction cost
        if self.gas_pool < TX_GAS {
            return Err(ExecError::AllGasUsed);
        }

        // 1. nonce
        let nonce = self.txn.get_nonce(from);
        if tx.nonce < nonce {
            return Err(ExecError::NonceTooLow { actual: tx.nonce, wanted: nonce });
        }
        if tx.nonce > nonce {
            return Err(ExecError::NonceTooHigh { actual: tx.nonce, wanted: nonce });
        }

        // 2. the sender prepays the full gas allowance
        let upfront = tx.gas_price.saturating_mul(U256::from(tx.gas));
        self.txn.sub_balance(from, upfront).map_err(|_| ExecError::NotEnoughFundsForGas)?;

        // 3. the block pool must cover the allowance
        if self.gas_pool < tx.gas {
            return Err(ExecError::BlockLimitReached);
        }
        self.gas_pool -= tx.gas;

        // 4.-6. intrinsic gas
        let intrinsic = transaction_gas_cost(tx, self.forks.homestead, self.forks.istanbul)?;
        let gas_left = tx.gas.checked_sub(intrinsic).ok_or(ExecError::NotEnoughIntrinsicGas)?;

        // 7. the sender can cover the transfer
        if self.txn.get_balance(from) < tx.value {
            return Err(ExecError::NotEnoughFunds);
        }

        self.ctx.gas_price = B256::from(tx.gas_price.to_be_bytes::<32>());
        self.ctx.origin = from;

        let mut result = if tx.is_contract_creation() {
            self.create2(from, tx.input.to_vec(), tx.value, gas_left)
        } else {
            self.txn.incr_nonce(from);
            let to = tx.to.expect("not a creation");
            self.call2(from, to, tx.input.to_vec(), tx.value, gas_left)
        };

        // 8. refund up to half of the used gas, return the rest
        let refund = self.txn.get_refund();
        result.update_gas_used(tx.gas, refund);

        let remaining = U256::from(result.gas_left).saturating_mul(tx.gas_price);
        self.txn.add_balance(from, remaining);

        let coinbase_fee = U256::from(result.gas_used).saturating_mul(tx.gas_price);
        let coinbase = self.ctx.coinbase;
        self.txn.add_balance(coinbase, coinbase_fee);

        self.gas_pool += result.gas_left;

        Ok(result)
    }

    /// Commits the transition, returning the new snapshot and state root.
    pub fn commit(mut self) -> Result<(Trie, B256), ExecError> {
        let objects = self.txn.commit(self.forks.eip155);
        let (snapshot, root) = self.txn.snapshot_trie().commit(&self.state, &objects)?;
        Ok((snapshot, root))
    }

    /// Top-level contract creation frame.
    pub fn create2(
        &mut self,
        caller: Address,
        code: Vec<u8>,
        value: U256,
        gas: u64,
    ) -> ExecutionResult {
        let address = crypto::create_address(caller, self.txn.get_nonce(caller));
        let contract =
            Contract::new_creation(CallType::Create, 1, caller, address, value, gas, code);
        self.apply_create(contract)
    }

    /// Top-level call frame.
    pub fn call2(
        &mut self,
        caller: Address,
        to: Address,
        input: Vec<u8>,
        value: U256,
        gas: u64,
    ) -> ExecutionResult {
        let code = self.txn.get_code(to);
        let contract =
            Contract::new_call(CallType::Call, 1, caller, to, value, gas, code, input);
        self.apply_call(contract)
    }

    fn handle_bridge_logs(
        &mut self,
        tx: &Transaction,
        logs: &[dogesync_primitives::Log],
    ) -> Result<(), ExecError> {
        if logs.is_empty() || tx.to != Some(dogesync_contracts::BRIDGE_CONTRACT) {
            return Ok(());
        }

        for log in logs {
            let Some(topic) = log.topics.first() else { continue };

            if *topic == *bridge::BRIDGE_DEPOSITED_EVENT_ID {
                let event = bridge::parse_deposited_log(log)?;
                self.txn.add_balance(event.receiver, event.amount);
            } else if *topic == *bridge::BRIDGE_WITHDRAWN_EVENT_ID {
                let event = bridge::parse_withdrawn_log(log)?;

                // the withdrawn total includes the fee, which goes to the
                // vault contract
                let total = event.amount.saturating_add(event.fee);
                self.txn
                    .sub_balance(event.contract, total)
                    .map_err(|_| ExecError::NotEnoughFunds)?;
                self.txn.add_balance(VAULT_CONTRACT, event.fee);
            } else if *topic == *bridge::BRIDGE_BURNED_EVENT_ID {
                let event = bridge::parse_burned_log(log)?;
                self.txn
                    .sub_balance(event.sender, event.amount)
                    .map_err(|_| ExecError::NotEnoughFunds)?;
            }
        }

        Ok(())
    }

    fn run_contract(&mut self, contract: &Contract) -> ExecutionResult {
        let runtimes = Arc::clone(&self.runtimes);
        let forks = self.forks;

        for runtime in runtimes.iter() {
            if runtime.can_run(contract, self, &forks) {
                return runtime.run(contract, self, &forks);
            }
        }

        ExecutionResult::error(VmError::NotFound, 0)
    }

    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), VmError> {
        if amount.is_zero() {
            self.txn.add_balance(to, U256::ZERO);
            return Ok(());
        }

        self.txn.sub_balance(from, amount).map_err(|_| VmError::InsufficientBalance)?;
        self.txn.add_balance(to, amount);
        Ok(())
    }

    fn apply_call(&mut self, contract: Contract) -> ExecutionResult {
        if contract.depth > MAX_CALL_DEPTH {
            return ExecutionResult::error(VmError::Depth, contract.gas);
        }

        if self.tracing {
            if contract.depth <= 1 {
                self.tracer.capture_start(
                    contract.caller,
                    contract.address,
                    false,
                    &contract.input,
                    contract.gas,
                    contract.value,
                );
            } else {
                self.tracer.capture_enter(
                    contract.call_type as u8,
                    contract.caller,
                    contract.address,
                    &contract.input,
                    contract.gas,
                    contract.value,
                );
            }
        }

        let checkpoint = self.txn.checkpoint();
        self.txn.touch_account(contract.address);

        let result = if contract.call_type == CallType::Call {
            // transfers only happen on plain calls
            match self.transfer(contract.caller, contract.address, contract.value) {
                Ok(()) => self.run_contract(&contract),
                Err(err) => ExecutionResult::error(err, contract.gas),
            }
        } else {
            self.run_contract(&contract)
        };

        if result.failed() {
            self.txn.revert_to_checkpoint(checkpoint);
        }

        if self.tracing {
            if contract.depth <= 1 {
                self.tracer.capture_end(&result.return_value, result.gas_used, result.err.as_ref());
            } else {
                self.tracer.capture_exit(&result.return_value, result.gas_used, result.err.as_ref());
            }
        }

        result
    }

    fn has_code_or_nonce(&mut self, address: Address) -> bool {
        if self.txn.get_nonce(address) != 0 {
            return true;
        }
        let code_hash = self.txn.get_code_hash(address);
        code_hash != dogesync_primitives::KECCAK_EMPTY && code_hash != B256::ZERO
    }

    fn apply_create(&mut self, contract: Contract) -> ExecutionResult {
        let gas_limit = contract.gas;

        if contract.depth > MAX_CALL_DEPTH {
            return ExecutionResult::error(VmError::Depth, gas_limit);
        }

        self.txn.incr_nonce(contract.caller);

        if self.has_code_or_nonce(contract.address) {
            return ExecutionResult::error(VmError::ContractAddressCollision, 0);
        }

        if self.tracing {
            if contract.depth <= 1 {
                self.tracer.capture_start(
                    contract.caller,
                    contract.address,
                    true,
                    &contract.code,
                    contract.gas,
                    contract.value,
                );
            } else {
                self.tracer.capture_enter(
                    contract.call_type as u8,
                    contract.caller,
                    contract.address,
                    &contract.code,
                    contract.gas,
                    contract.value,
                );
            }
        }

        let checkpoint = self.txn.checkpoint();

        if self.forks.eip158 {
            self.txn.create_account(contract.address);
            self.txn.incr_nonce(contract.address);
        }

        let mut result = match self.transfer(contract.caller, contract.address, contract.value) {
            Ok(()) => self.run_contract(&contract),
            Err(err) => {
                let result = ExecutionResult::error(err, gas_limit);
                self.trace_create_end(&contract, &result);
                return result;
            }
        };

        if result.failed() {
            self.txn.revert_to_checkpoint(checkpoint);
            self.trace_create_end(&contract, &result);
            return result;
        }

        if self.forks.eip158 && result.return_value.len() > SPURIOUS_DRAGON_MAX_CODE_SIZE {
            self.txn.revert_to_checkpoint(checkpoint);
            let result = ExecutionResult::error(VmError::MaxCodeSizeExceeded, 0);
            self.trace_create_end(&contract, &result);
            return result;
        }

        let deposit_cost = result.return_value.len() as u64 * CODE_DEPOSIT_GAS_PER_BYTE;
        if result.gas_left < deposit_cost {
            result.err = Some(VmError::CodeStoreOutOfGas);
            result.return_value = Vec::new();

            if self.forks.homestead {
                self.txn.revert_to_checkpoint(checkpoint);
                result.gas_left = 0;
            }

            self.trace_create_end(&contract, &result);
            return result;
        }

        result.gas_left -= deposit_cost;
        self.txn.set_code(contract.address, &result.return_value);
        result.created = Some(contract.address);

        self.trace_create_end(&contract, &result);
        result
    }

    fn trace_create_end(&mut self, contract: &Contract, result: &ExecutionResult) {
        if !self.tracing {
            return;
        }
        if contract.depth <= 1 {
            self.tracer.capture_end(&result.return_value, result.gas_used, result.err.as_ref());
        } else {
            self.tracer.capture_exit(&result.return_value, result.gas_used, result.err.as_ref());
        }
    }
}

impl Host for Transition {
    fn account_exists(&mut self, address: Address) -> bool {
        self.txn.exist(address)
    }

    fn empty_account(&mut self, address: Address) -> bool {
        self.txn.empty(address)
    }

    fn get_nonce(&mut self, address: Address) -> u64 {
        self.txn.get_nonce(address)
    }

    fn get_balance(&mut self, address: Address) -> U256 {
        self.txn.get_balance(address)
    }

    fn get_code(&mut self, address: Address) -> Vec<u8> {
        self.txn.get_code(address)
    }

    fn get_code_size(&mut self, address: Address) -> usize {
        self.txn.get_code_size(address)
    }

    fn get_code_hash(&mut self, address: Address) -> B256 {
        self.txn.get_code_hash(address)
    }

    fn get_storage(&mut self, address: Address, key: B256) -> B256 {
        self.txn.get_state(address, key)
    }

    fn set_storage(
        &mut self,
        address: Address,
        key: B256,
        value: B256,
        forks: &ForksInTime,
    ) -> StorageStatus {
        self.txn.set_storage(address, key, value, forks)
    }

    fn add_refund(&mut self, gas: u64) {
        self.txn.add_refund(gas);
    }

    fn refund(&mut self) -> u64 {
        self.txn.get_refund()
    }

    fn selfdestruct(&mut self, address: Address, beneficiary: Address) {
        if !self.txn.has_suicided(address) {
            self.txn.add_refund(SELFDESTRUCT_REFUND);
        }

        let balance = self.txn.get_balance(address);
        self.txn.add_balance(beneficiary, balance);
        self.txn.suicide(address);
    }

    fn has_suicided(&mut self, address: Address) -> bool {
        self.txn.has_suicided(address)
    }

    fn emit_log(&mut self, address: Address, topics: Vec<B256>, data: Vec<u8>) {
        self.txn.emit_log(address, topics, data);
    }

    fn get_tx_context(&self) -> TxContext {
        self.ctx
    }

    fn get_block_hash(&mut self, number: u64) -> B256 {
        (self.get_hash)(number)
    }

    fn callx(&mut self, contract: Contract) -> ExecutionResult {
        if contract.is_creation() {
            self.apply_create(contract)
        } else {
            self.apply_call(contract)
        }
    }

    fn tracing_enabled(&self) -> bool {
        self.tracing
    }

    fn capture_state(
        &mut self,
        scope: &ScopeContext,
        ip: usize,
        op: u8,
        gas: u64,
        gas_cost: u64,
    ) {
        self.tracer.capture_state(scope, ip, op, gas, gas_cost);
    }

    fn capture_fault(
        &mut self,
        scope: &ScopeContext,
        ip: usize,
        op: u8,
        gas: u64,
        gas_cost: u64,
        err: &VmError,
    ) {
        self.tracer.capture_fault(scope, ip, op, gas, gas_cost, err);
    }
}

/// Intrinsic gas of a transaction, with overflow detection.
pub fn transaction_gas_cost(
    tx: &Transaction,
    is_homestead: bool,
    is_istanbul: bool,
) -> Result<u64, ExecError> {
    let mut cost: u64 = if tx.is_contract_creation() && is_homestead {
        TX_GAS_CONTRACT_CREATION
    } else {
        TX_GAS
    };

    if !tx.input.is_empty() {
        let zeros = tx.input.iter().filter(|b| **b == 0).count() as u64;
        let non_zeros = tx.input.len() as u64 - zeros;
        let non_zero_cost: u64 = if is_istanbul { 16 } else { 68 };

        if (u64::MAX - cost) / non_zero_cost < non_zeros {
            return Err(ExecError::IntrinsicGasOverflow);
        }
        cost += non_zeros * non_zero_cost;

        if (u64::MAX - cost) / 4 < zeros {
            return Err(ExecError::IntrinsicGasOverflow);
        }
        cost += zeros * 4;
    }

    Ok(cost)
}

