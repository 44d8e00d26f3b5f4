use crate::{
    storage::{get_node, TrieStorage},
    Trie, TrieError,
};
use dogesync_primitives::{B256, EMPTY_ROOT_HASH};
use lru::LruCache;
use parking_lot::Mutex;
use std::{num::NonZeroUsize, sync::Arc};

const CODE_LRU_CACHE_SIZE: usize = 8192;
const TRIE_STATE_LRU_CACHE_SIZE: usize = 2048;
const ACCOUNT_STATE_LRU_CACHE_SIZE: usize = 4096;

/// The state store: hands out [`Trie`] snapshots per root and caches
/// recently used global-state roots, per-account storage roots and contract
/// code.
pub struct State {
    storage: Arc<dyn TrieStorage>,
    code_cache: Mutex<LruCache<B256, Vec<u8>>>,
    trie_state_cache: Mutex<LruCache<B256, Trie>>,
    account_state_cache: Mutex<LruCache<B256, Trie>>,
}

impl State {
    pub fn new(storage: Arc<dyn TrieStorage>) -> Self {
        Self {
            storage,
            code_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CODE_LRU_CACHE_SIZE).expect("nonzero"),
            )),
            trie_state_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(TRIE_STATE_LRU_CACHE_SIZE).expect("nonzero"),
            )),
            account_state_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(ACCOUNT_STATE_LRU_CACHE_SIZE).expect("nonzero"),
            )),
        }
    }

    /// An empty snapshot, no I/O.
    pub fn new_snapshot(&self) -> Trie {
        Trie::empty(Arc::clone(&self.storage))
    }

    /// A snapshot at `root`. The empty root short-circuits without touching
    /// storage; unknown roots are an error.
    pub fn new_snapshot_at(&self, root: B256) -> Result<Trie, TrieError> {
        if root == EMPTY_ROOT_HASH {
            return Ok(self.new_snapshot());
        }

        if let Some(trie) = self.trie_state_cache.lock().get(&root) {
            return Ok(trie.clone());
        }
        if let Some(trie) = self.account_state_cache.lock().get(&root) {
            return Ok(trie.clone());
        }

        let node =
            get_node(self.storage.as_ref(), root)?.ok_or(TrieError::RootNotFound(root))?;
        Ok(Trie::with_root(Arc::clone(&self.storage), node))
    }

    /// A storage-trie snapshot of one account, preferring the account-state
    /// cache.
    pub fn storage_snapshot_at(&self, root: B256) -> Result<Trie, TrieError> {
        if root == EMPTY_ROOT_HASH {
            return Ok(self.new_snapshot());
        }
        if let Some(trie) = self.account_state_cache.lock().get(&root) {
            return Ok(trie.clone());
        }

        let node =
            get_node(self.storage.as_ref(), root)?.ok_or(TrieError::RootNotFound(root))?;
        Ok(Trie::with_root(Arc::clone(&self.storage), node))
    }

    pub fn set_code(&self, hash: B256, code: &[u8]) -> Result<(), TrieError> {
        self.storage.set_code(hash, code)?;
        self.code_cache.lock().put(hash, code.to_vec());
        Ok(())
    }

    pub fn get_code(&self, hash: B256) -> Option<Vec<u8>> {
        if let Some(code) = self.code_cache.lock().get(&hash) {
            return Some(code.clone());
        }

        let code = self.storage.get_code(hash).ok().flatten()?;
        self.code_cache.lock().put(hash, code.clone());
        Some(code)
    }

    pub fn add_account_state(&self, root: B256, trie: Trie) {
        self.account_state_cache.lock().put(root, trie);
    }

    pub fn add_trie_state(&self, root: B256, trie: Trie) {
        self.trie_state_cache.lock().put(root, trie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KvTrieStorage;
    use dogesync_kvdb::MemDb;
    use dogesync_primitives::keccak256;

    fn state() -> State {
        State::new(Arc::new(KvTrieStorage::new(Arc::new(MemDb::new()))))
    }

    #[test]
    fn empty_root_needs_no_storage() {
        let state = state();
        let snapshot = state.new_snapshot_at(EMPTY_ROOT_HASH).unwrap();
        assert_eq!(snapshot.root_hash(), EMPTY_ROOT_HASH);
    }

    #[test]
    fn unknown_root_is_an_error() {
        let state = state();
        let missing = B256::repeat_byte(0x99);
        assert!(matches!(
            state.new_snapshot_at(missing),
            Err(TrieError::RootNotFound(root)) if root == missing
        ));
    }

    #[test]
    fn code_cache_roundtrip() {
        let state = state();
        let code = vec![0x60, 0x80, 0x60, 0x40];
        let hash = keccak256(&code);

        assert_eq!(state.get_code(hash), None);
        state.set_code(hash, &code).unwrap();
        assert_eq!(state.get_code(hash), Some(code));
    }
}
