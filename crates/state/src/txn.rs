use dogesync_chainspec::ForksInTime;
use dogesync_evm::StorageStatus;
use dogesync_primitives::{
    keccak256, Account, Address, Bytes, Log, B256, KECCAK_EMPTY, U256,
};
use dogesync_trie::{State, StateObject, Trie};
use std::{collections::HashMap, sync::Arc};

/// EIP-2200 refund for clearing a storage slot.
const SSTORE_CLEARS_SCHEDULE: u64 = 15_000;
/// Refund when a slot added earlier in the same transaction is cleared
/// again (`20000 - 800`).
const SSTORE_SET_REVERSAL: u64 = 19_200;
/// Refund when a dirty slot is restored to its committed value
/// (`5000 - 800`).
const SSTORE_RESET_REVERSAL: u64 = 4_200;

/// One account's in-flight view.
#[derive(Clone, Debug)]
struct TxnAccount {
    account: Account,
    /// Code deployed in this transition.
    dirty_code: Option<Bytes>,
    /// Slots written in this transition.
    storage: HashMap<B256, B256>,
    suicided: bool,
    touched: bool,
    /// Whether the account exists in the underlying snapshot or was created
    /// here.
    exists: bool,
    dirty: bool,
}

impl TxnAccount {
    fn fresh() -> Self {
        Self {
            account: Account::default(),
            dirty_code: None,
            storage: HashMap::new(),
            suicided: false,
            touched: false,
            exists: false,
            dirty: false,
        }
    }

    fn is_empty(&self) -> bool {
        self.account.nonce == 0 &&
            self.account.balance.is_zero() &&
            self.account.code_hash == KECCAK_EMPTY &&
            self.dirty_code.is_none()
    }
}

/// The account's balance cannot cover the requested debit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InsufficientBalance;

/// Inverse operations for [`Txn::revert_to_checkpoint`].
enum JournalEntry {
    AccountLoaded { address: Address },
    AccountCreated { address: Address },
    AccountReplaced { address: Address, prior: Box<TxnAccount> },
    BalanceChanged { address: Address, prior: U256 },
    NonceChanged { address: Address, prior: u64 },
    CodeChanged { address: Address, prior_code: Option<Bytes>, prior_hash: B256 },
    StorageChanged { address: Address, key: B256, prior: Option<B256> },
    SuicideMarked { address: Address, prior: bool, prior_balance: U256 },
    Touched { address: Address, prior: bool },
    RefundChanged { prior: u64 },
    LogAdded,
}

/// A journalled, transactional overlay on a trie snapshot.
///
/// Every modification is recorded with its inverse, so a revert restores
/// exactly the pre-snapshot view, logs and refund included. Reads fall
/// through the overlay into the snapshot.
pub struct Txn {
    state: Arc<State>,
    snapshot: Trie,
    accounts: HashMap<Address, TxnAccount>,
    /// Committed storage values per account, cached for EIP-2200.
    committed_storage: HashMap<(Address, B256), B256>,
    journal: Vec<JournalEntry>,
    logs: Vec<Log>,
    refund: u64,
}

impl Txn {
    pub fn new(state: Arc<State>, snapshot: Trie) -> Self {
        Self {
            state,
            snapshot,
            accounts: HashMap::new(),
            committed_storage: HashMap::new(),
            journal: Vec::new(),
            logs: Vec::new(),
            refund: 0,
        }
    }

    /// The trie snapshot this overlay reads through.
    pub fn snapshot_trie(&self) -> &Trie {
        &self.snapshot
    }

    // account loading

    fn load(&mut self, address: Address) -> Option<&TxnAccount> {
        if !self.accounts.contains_key(&address) {
            let key = keccak256(address.as_slice());
            let raw = self.snapshot.get(key.as_slice()).ok().flatten()?;
            let account =
                <Account as alloy_rlp::Decodable>::decode(&mut raw.as_slice()).ok()?;

            self.accounts.insert(
                address,
                TxnAccount { account, exists: true, ..TxnAccount::fresh() },
            );
            self.journal.push(JournalEntry::AccountLoaded { address });
        }

        self.accounts.get(&address).filter(|a| a.exists)
    }

    fn upsert(&mut self, address: Address) -> &mut TxnAccount {
        self.load(address);

        if !self.accounts.contains_key(&address) {
            // brand new account; journal its creation so a revert removes it
            self.journal.push(JournalEntry::AccountCreated { address });
            self.accounts
                .insert(address, TxnAccount { exists: true, dirty: true, ..TxnAccount::fresh() });
        } else {
            let entry = self.accounts.get(&address).expect("present");
            if !entry.exists {
                // recreation of a pending deletion keeps the prior record so
                // a revert restores the deletion
                self.journal.push(JournalEntry::AccountReplaced {
                    address,
                    prior: Box::new(entry.clone()),
                });
                let entry = self.accounts.get_mut(&address).expect("present");
                entry.exists = true;
                entry.dirty = true;
            }
        }

        self.accounts.get_mut(&address).expect("present")
    }

    pub fn exist(&mut self, address: Address) -> bool {
        self.load(address).is_some()
    }

    pub fn empty(&mut self, address: Address) -> bool {
        match self.load(address) {
            Some(account) => account.is_empty(),
            None => true,
        }
    }

    // balances

    pub fn get_balance(&mut self, address: Address) -> U256 {
        self.load(address).map(|a| a.account.balance).unwrap_or_default()
    }

    pub fn add_balance(&mut self, address: Address, amount: U256) {
        let prior = self.get_balance(address);
        self.journal.push(JournalEntry::BalanceChanged { address, prior });
        let entry = self.upsert(address);
        entry.account.balance = prior.saturating_add(amount);
        entry.touched = true;
        entry.dirty = true;
    }

    /// Fails when the account's balance is smaller than `amount`.
    pub fn sub_balance(
        &mut self,
        address: Address,
        amount: U256,
    ) -> Result<(), InsufficientBalance> {
        let prior = self.get_balance(address);
        if prior < amount {
            return Err(InsufficientBalance);
        }

        self.journal.push(JournalEntry::BalanceChanged { address, prior });
        let entry = self.upsert(address);
        entry.account.balance = prior - amount;
        entry.touched = true;
        entry.dirty = true;
        Ok(())
    }

    pub fn set_balance(&mut self, address: Address, balance: U256) {
        let prior = self.get_balance(address);
        self.journal.push(JournalEntry::BalanceChanged { address, prior });
        let entry = self.upsert(address);
        entry.account.balance = balance;
        entry.dirty = true;
    }

    // nonces

    pub fn get_nonce(&mut self, address: Address) -> u64 {
        self.load(address).map(|a| a.account.nonce).unwrap_or_default()
    }

    pub fn incr_nonce(&mut self, address: Address) {
        let prior = self.get_nonce(address);
        self.journal.push(JournalEntry::NonceChanged { address, prior });
        let entry = self.upsert(address);
        entry.account.nonce = prior + 1;
        entry.dirty = true;
    }

    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        let prior = self.get_nonce(address);
        self.journal.push(JournalEntry::NonceChanged { address, prior });
        let entry = self.upsert(address);
        entry.account.nonce = nonce;
        entry.dirty = true;
    }

    // code

    pub fn get_code(&mut self, address: Address) -> Vec<u8> {
        let Some(account) = self.load(address) else { return Vec::new() };
        if let Some(code) = &account.dirty_code {
            return code.to_vec();
        }

        let hash = account.account.code_hash;
        if hash == KECCAK_EMPTY || hash == B256::ZERO {
            return Vec::new();
        }
        self.state.get_code(hash).unwrap_or_default()
    }

    pub fn get_code_hash(&mut self, address: Address) -> B256 {
        self.load(address).map(|a| a.account.code_hash).unwrap_or_default()
    }

    pub fn get_code_size(&mut self, address: Address) -> usize {
        self.get_code(address).len()
    }

    pub fn set_code(&mut self, address: Address, code: &[u8]) {
        let (prior_code, prior_hash) = match self.load(address) {
            Some(a) => (a.dirty_code.clone(), a.account.code_hash),
            None => (None, KECCAK_EMPTY),
        };
        self.journal.push(JournalEntry::CodeChanged { address, prior_code, prior_hash });

        let entry = self.upsert(address);
        entry.account.code_hash = keccak256(code);
        entry.dirty_code = Some(code.to_vec().into());
        entry.dirty = true;
    }

    // storage

    /// The value visible to this transition: dirty slot first, committed
    /// value otherwise.
    pub fn get_state(&mut self, address: Address, key: B256) -> B256 {
        if let Some(account) = self.accounts.get(&address) {
            if let Some(value) = account.storage.get(&key) {
                return *value;
            }
        }
        self.get_committed_state(address, key)
    }

    /// The value as of the start of the transition.
    pub fn get_committed_state(&mut self, address: Address, key: B256) -> B256 {
        if let Some(value) = self.committed_storage.get(&(address, key)) {
            return *value;
        }

        let Some(account) = self.load(address) else { return B256::ZERO };
        let root = account.account.storage_root;

        let value = self
            .state
            .storage_snapshot_at(root)
            .ok()
            .and_then(|trie| trie.get(keccak256(key.as_slice()).as_slice()).ok().flatten())
            .and_then(|raw| {
                <U256 as alloy_rlp::Decodable>::decode(&mut raw.as_slice()).ok()
            })
            .map(|value| B256::from(value.to_be_bytes::<32>()))
            .unwrap_or_default();

        self.committed_storage.insert((address, key), value);
        value
    }

    /// Raw slot write, without gas status accounting. Used by genesis
    /// allocation and contract upgrades.
    pub fn set_state(&mut self, address: Address, key: B256, value: B256) {
        let prior = self.accounts.get(&address).and_then(|a| a.storage.get(&key).copied());
        self.journal.push(JournalEntry::StorageChanged { address, key, prior });

        let entry = self.upsert(address);
        entry.storage.insert(key, value);
        entry.dirty = true;
    }

    /// Journalled slot write with the EIP-2200 status classification the
    /// `SSTORE` gas schedule needs. Refund accounting happens here.
    pub fn set_storage(
        &mut self,
        address: Address,
        key: B256,
        value: B256,
        forks: &ForksInTime,
    ) -> StorageStatus {
        let current = self.get_state(address, key);
        if current == value {
            return StorageStatus::Unchanged;
        }

        let legacy_metering = !forks.istanbul && (forks.petersburg || !forks.constantinople);
        if legacy_metering {
            let status = if current.is_zero() {
                StorageStatus::Added
            } else if value.is_zero() {
                self.add_refund(SSTORE_CLEARS_SCHEDULE);
                StorageStatus::Deleted
            } else {
                StorageStatus::Modified
            };
            self.set_state(address, key, value);
            return status;
        }

        let original = self.get_committed_state(address, key);
        let status = if original == current {
            // clean slot
            if original.is_zero() {
                StorageStatus::Added
            } else if value.is_zero() {
                self.add_refund(SSTORE_CLEARS_SCHEDULE);
                StorageStatus::Deleted
            } else {
                StorageStatus::Modified
            }
        } else if original.is_zero() {
            // the slot was added earlier in this transition
            if value.is_zero() {
                self.add_refund(SSTORE_SET_REVERSAL);
                StorageStatus::AddedDeleted
            } else {
                StorageStatus::ModifiedAgain
            }
        } else {
            // dirty slot with a committed original
            if current.is_zero() {
                self.sub_refund(SSTORE_CLEARS_SCHEDULE);
            } else if value.is_zero() {
                self.add_refund(SSTORE_CLEARS_SCHEDULE);
            }
            if value == original {
                self.add_refund(SSTORE_RESET_REVERSAL);
                StorageStatus::ModifiedRestored
            } else if current.is_zero() {
                StorageStatus::DeletedAdded
            } else {
                StorageStatus::ModifiedAgain
            }
        };

        self.set_state(address, key, value);
        status
    }

    // account lifecycle

    /// Forces a fresh account. The balance survives, storage does not.
    pub fn create_account(&mut self, address: Address) {
        let prior_balance = self.get_balance(address);
        let prior = self.accounts.get(&address).cloned();
        self.journal.push(match prior {
            Some(prior) => JournalEntry::AccountReplaced { address, prior: Box::new(prior) },
            None => JournalEntry::AccountReplaced {
                address,
                prior: Box::new(TxnAccount::fresh()),
            },
        });

        let mut fresh = TxnAccount::fresh();
        fresh.exists = true;
        fresh.dirty = true;
        fresh.account.balance = prior_balance;
        self.accounts.insert(address, fresh);
    }

    pub fn suicide(&mut self, address: Address) {
        let prior_balance = self.get_balance(address);
        let prior = self.load(address).map(|a| a.suicided).unwrap_or(false);
        self.journal.push(JournalEntry::SuicideMarked { address, prior, prior_balance });

        let entry = self.upsert(address);
        entry.suicided = true;
        entry.account.balance = U256::ZERO;
        entry.dirty = true;
    }

    pub fn has_suicided(&mut self, address: Address) -> bool {
        self.load(address).map(|a| a.suicided).unwrap_or(false)
    }

    pub fn touch_account(&mut self, address: Address) {
        let prior = self.accounts.get(&address).map(|a| a.touched).unwrap_or(false);
        self.journal.push(JournalEntry::Touched { address, prior });
        self.upsert(address).touched = true;
    }

    // logs and refunds

    pub fn emit_log(&mut self, address: Address, topics: Vec<B256>, data: Vec<u8>) {
        self.journal.push(JournalEntry::LogAdded);
        self.logs.push(Log { address, topics, data: data.into() });
    }

    /// Drains the logs collected so far.
    pub fn take_logs(&mut self) -> Vec<Log> {
        std::mem::take(&mut self.logs)
    }

    pub fn add_refund(&mut self, gas: u64) {
        self.journal.push(JournalEntry::RefundChanged { prior: self.refund });
        self.refund += gas;
    }

    pub fn sub_refund(&mut self, gas: u64) {
        self.journal.push(JournalEntry::RefundChanged { prior: self.refund });
        self.refund = self.refund.saturating_sub(gas);
    }

    pub fn get_refund(&self) -> u64 {
        self.refund
    }

    // snapshots

    /// Marks a revert point for the current frame.
    pub fn checkpoint(&mut self) -> usize {
        self.journal.len()
    }

    /// Rolls back every modification past `checkpoint`, logs and refund
    /// included.
    pub fn revert_to_checkpoint(&mut self, checkpoint: usize) {
        while self.journal.len() > checkpoint {
            match self.journal.pop().expect("journal length checked") {
                JournalEntry::AccountLoaded { address } => {
                    // the clean loaded copy stays; dropping it would only
                    // force a reload
                    let _ = address;
                }
                JournalEntry::AccountCreated { address } => {
                    self.accounts.remove(&address);
                }
                JournalEntry::AccountReplaced { address, prior } => {
                    if prior.exists || prior.dirty {
                        self.accounts.insert(address, *prior);
                    } else {
                        self.accounts.remove(&address);
                    }
                }
                JournalEntry::BalanceChanged { address, prior } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        account.account.balance = prior;
                    }
                }
                JournalEntry::NonceChanged { address, prior } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        account.account.nonce = prior;
                    }
                }
                JournalEntry::CodeChanged { address, prior_code, prior_hash } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        account.dirty_code = prior_code;
                        account.account.code_hash = prior_hash;
                    }
                }
                JournalEntry::StorageChanged { address, key, prior } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        match prior {
                            Some(value) => account.storage.insert(key, value),
                            None => account.storage.remove(&key),
                        };
                    }
                }
                JournalEntry::SuicideMarked { address, prior, prior_balance } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        account.suicided = prior;
                        account.account.balance = prior_balance;
                    }
                }
                JournalEntry::Touched { address, prior } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        account.touched = prior;
                    }
                }
                JournalEntry::RefundChanged { prior } => self.refund = prior,
                JournalEntry::LogAdded => {
                    self.logs.pop();
                }
            }
        }
    }

    /// Removes suicided objects between transactions; with
    /// `delete_empty_objects` (EIP-158) touched-but-empty accounts go too.
    pub fn clean_delete_objects(&mut self, delete_empty_objects: bool) {
        for account in self.accounts.values_mut() {
            if account.suicided {
                account.exists = false;
                account.dirty = true;
            } else if delete_empty_objects && account.touched && account.is_empty() {
                account.exists = false;
                account.dirty = true;
            }
            account.touched = false;
        }
        self.journal.clear();
        self.refund = 0;
    }

    /// Produces the modified objects for the trie commit, in address order.
    pub fn commit(&mut self, delete_empty_objects: bool) -> Vec<StateObject> {
        self.clean_delete_objects(delete_empty_objects);

        let mut addresses: Vec<Address> =
            self.accounts.iter().filter(|(_, a)| a.dirty).map(|(addr, _)| *addr).collect();
        addresses.sort();

        let mut objects = Vec::with_capacity(addresses.len());
        for address in addresses {
            let account = &self.accounts[&address];

            let mut object = StateObject::new(address);
            if !account.exists {
                object.deleted = true;
                objects.push(object);
                continue;
            }

            object.nonce = account.account.nonce;
            object.balance = account.account.balance;
            object.root = account.account.storage_root;
            object.code_hash = account.account.code_hash;
            object.code = account.dirty_code.clone();

            let mut slots: Vec<(B256, B256)> =
                account.storage.iter().map(|(k, v)| (*k, *v)).collect();
            slots.sort();
            object.storage = slots;

            objects.push(object);
        }

        objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogesync_chainspec::Forks;
    use dogesync_kvdb::MemDb;
    use dogesync_trie::KvTrieStorage;

    fn txn() -> Txn {
        let state = Arc::new(State::new(Arc::new(KvTrieStorage::new(Arc::new(MemDb::new())))));
        let snapshot = state.new_snapshot();
        Txn::new(state, snapshot)
    }

    const ADDR: Address = Address::repeat_byte(0x11);

    #[test]
    fn balance_arithmetic() {
        let mut txn = txn();
        txn.add_balance(ADDR, U256::from(100u64));
        assert_eq!(txn.get_balance(ADDR), U256::from(100u64));

        txn.sub_balance(ADDR, U256::from(40u64)).unwrap();
        assert_eq!(txn.get_balance(ADDR), U256::from(60u64));

        assert!(txn.sub_balance(ADDR, U256::from(61u64)).is_err());
        assert_eq!(txn.get_balance(ADDR), U256::from(60u64));
    }

    #[test]
    fn revert_restores_everything() {
        let mut txn = txn();
        txn.add_balance(ADDR, U256::from(10u64));
        txn.set_nonce(ADDR, 5);

        let checkpoint = txn.checkpoint();

        txn.add_balance(ADDR, U256::from(90u64));
        txn.incr_nonce(ADDR);
        txn.set_state(ADDR, B256::with_last_byte(1), B256::with_last_byte(2));
        txn.emit_log(ADDR, vec![B256::ZERO], vec![1, 2, 3]);
        txn.add_refund(15_000);

        txn.revert_to_checkpoint(checkpoint);

        assert_eq!(txn.get_balance(ADDR), U256::from(10u64));
        assert_eq!(txn.get_nonce(ADDR), 5);
        assert_eq!(txn.get_state(ADDR, B256::with_last_byte(1)), B256::ZERO);
        assert!(txn.take_logs().is_empty());
        assert_eq!(txn.get_refund(), 0);
    }

    #[test]
    fn nested_reverts_unwind_in_order() {
        let mut txn = txn();
        txn.add_balance(ADDR, U256::from(1u64));

        let outer = txn.checkpoint();
        txn.add_balance(ADDR, U256::from(1u64));
        let inner = txn.checkpoint();
        txn.add_balance(ADDR, U256::from(1u64));

        txn.revert_to_checkpoint(inner);
        assert_eq!(txn.get_balance(ADDR), U256::from(2u64));

        txn.revert_to_checkpoint(outer);
        assert_eq!(txn.get_balance(ADDR), U256::from(1u64));
    }

    #[test]
    fn storage_status_classification() {
        let forks = Forks::all_at_genesis().at(0);
        let mut txn = txn();
        let key = B256::with_last_byte(1);

        // fresh slot
        assert_eq!(
            txn.set_storage(ADDR, key, B256::with_last_byte(7), &forks),
            StorageStatus::Added
        );
        // same value again
        assert_eq!(
            txn.set_storage(ADDR, key, B256::with_last_byte(7), &forks),
            StorageStatus::Unchanged
        );
        // modify the freshly added slot
        assert_eq!(
            txn.set_storage(ADDR, key, B256::with_last_byte(8), &forks),
            StorageStatus::ModifiedAgain
        );
        // delete it again: the set refund comes back
        assert_eq!(
            txn.set_storage(ADDR, key, B256::ZERO, &forks),
            StorageStatus::AddedDeleted
        );
        assert_eq!(txn.get_refund(), SSTORE_SET_REVERSAL);
    }

    #[test]
    fn suicide_zeroes_balance() {
        let mut txn = txn();
        txn.add_balance(ADDR, U256::from(55u64));

        let checkpoint = txn.checkpoint();
        txn.suicide(ADDR);
        assert!(txn.has_suicided(ADDR));
        assert_eq!(txn.get_balance(ADDR), U256::ZERO);

        txn.revert_to_checkpoint(checkpoint);
        assert!(!txn.has_suicided(ADDR));
        assert_eq!(txn.get_balance(ADDR), U256::from(55u64));
    }

    #[test]
    fn commit_emits_sorted_dirty_objects() {
        let mut txn = txn();
        let high = Address::repeat_byte(0xee);
        txn.add_balance(high, U256::from(1u64));
        txn.add_balance(ADDR, U256::from(2u64));

        let objects = txn.commit(true);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].address, ADDR);
        assert_eq!(objects[1].address, high);
    }

    #[test]
    fn suicided_accounts_become_deletions() {
        let mut txn = txn();
        txn.add_balance(ADDR, U256::from(9u64));
        txn.suicide(ADDR);

        let objects = txn.commit(true);
        assert_eq!(objects.len(), 1);
        assert!(objects[0].deleted);
    }
}
