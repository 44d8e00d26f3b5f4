use dogesync_primitives::{BlockNumber, B256};
use dogesync_rawdb::RawDbError;
use dogesync_state::ExecError;
use dogesync_trie::TrieError;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("blockchain is closed")]
    Closed,
    #[error("block already written: head {head} >= block {block}")]
    ExistBlock { head: BlockNumber, block: BlockNumber },
    #[error("parent of block {0} not found")]
    ParentNotFound(BlockNumber),
    #[error("parent hash mismatch at block {number}: have {have}, want {want}")]
    InvalidParentHash { number: BlockNumber, have: B256, want: B256 },
    #[error("header hash mismatch at block {number}: have {have}, want {want}")]
    InvalidHeaderHash { number: BlockNumber, have: B256, want: B256 },
    #[error("transaction root mismatch: have {have}, want {want}")]
    InvalidTxRoot { have: B256, want: B256 },
    #[error("receipts root mismatch: have {have}, want {want}")]
    InvalidReceiptsRoot { have: B256, want: B256 },
    #[error("state root mismatch: have {have}, want {want}")]
    InvalidStateRoot { have: B256, want: B256 },
    #[error("genesis file does not match current genesis: stored {stored}, computed {computed}")]
    GenesisMismatch { stored: B256, computed: B256 },
    #[error("failed to recover block proposer: {0}")]
    Proposer(#[from] dogesync_primitives::crypto::SignerError),
    #[error(transparent)]
    RawDb(#[from] RawDbError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Trie(#[from] TrieError),
}
