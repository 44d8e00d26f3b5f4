//! Content-addressed Merkle-Patricia trie.
//!
//! A [`Trie`] is an immutable snapshot at one state root: updates path-copy
//! and commits hash every in-memory node into the `trie` DBI under the
//! keccak256 of its encoding. [`State`] hands out snapshots and keeps LRU
//! caches of recently used roots and contract code.

mod nibbles;
mod node;
mod object;
mod state;
mod storage;
mod trie;

pub use object::StateObject;
pub use state::State;
pub use storage::{KvTrieStorage, TrieStorage};
pub use trie::Trie;

use dogesync_kvdb::KvError;
use dogesync_primitives::B256;

#[derive(Debug, thiserror::Error)]
pub enum TrieError {
    #[error("state not found at root {0}")]
    RootNotFound(B256),
    #[error("corrupt trie node: {0}")]
    CorruptNode(&'static str),
    #[error("dangling node reference {0}")]
    DanglingNode(B256),
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error("rlp error: {0}")]
    Rlp(#[from] alloy_rlp::Error),
}
