use crate::TrieError;
use dogesync_kvdb::{Database, KvError, CODE_DBI, TRIE_DBI};
use dogesync_primitives::B256;
use std::sync::Arc;

/// Storage the trie persists through: nodes keyed by hash plus the code
/// side-table.
pub trait TrieStorage: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    fn set_code(&self, hash: B256, code: &[u8]) -> Result<(), KvError>;

    fn get_code(&self, hash: B256) -> Result<Option<Vec<u8>>, KvError>;

    /// Writes a commit's node batch atomically.
    fn write_nodes(&self, nodes: &[(B256, Vec<u8>)]) -> Result<(), KvError>;
}

/// [`TrieStorage`] over the node's kv store (`trie` and `code` DBIs).
pub struct KvTrieStorage {
    db: Arc<dyn Database>,
}

impl KvTrieStorage {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

impl TrieStorage for KvTrieStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        self.db.get(TRIE_DBI, key)
    }

    fn set_code(&self, hash: B256, code: &[u8]) -> Result<(), KvError> {
        self.db.set(CODE_DBI, hash.as_slice(), code.to_vec())
    }

    fn get_code(&self, hash: B256) -> Result<Option<Vec<u8>>, KvError> {
        self.db.get(CODE_DBI, hash.as_slice())
    }

    fn write_nodes(&self, nodes: &[(B256, Vec<u8>)]) -> Result<(), KvError> {
        let mut batch = self.db.batch();
        for (hash, encoding) in nodes {
            batch.set(TRIE_DBI, hash.as_slice(), encoding);
        }
        batch.write()
    }
}

/// Loads and decodes the node stored under `hash`.
pub(crate) fn get_node(
    storage: &dyn TrieStorage,
    hash: B256,
) -> Result<Option<std::sync::Arc<crate::node::Node>>, TrieError> {
    match storage.get(hash.as_slice())? {
        Some(encoding) => Ok(Some(crate::node::decode_node(&encoding)?)),
        None => Ok(None),
    }
}
