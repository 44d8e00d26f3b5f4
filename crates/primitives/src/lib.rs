//! Commonly used types for the dogesync node.
//!
//! Everything that is part of the consensus encoding lives here: headers,
//! transactions, receipts, blocks, the IBFT extra-data envelope, account
//! state, ordered trie roots and signature recovery.

mod account;
mod block;
pub mod crypto;
mod header;
pub mod ibft;
pub mod proofs;
mod receipt;
mod transaction;

pub use account::Account;
pub use block::{Block, Body};
pub use header::{Header, SealedHeader};
pub use ibft::{IbftExtra, IBFT_EXTRA_VANITY};
pub use receipt::{logs_bloom, Log, Receipt, ReceiptStatus};
pub use transaction::Transaction;

pub use alloy_primitives::{
    address, b256, keccak256, Address, Bloom, BloomInput, Bytes, B256, B512, B64, U256,
};

/// A block number.
pub type BlockNumber = u64;

/// A transaction hash.
pub type TxHash = B256;

/// An EIP-155 chain id.
pub type ChainId = u64;

/// Network identifier of a peer.
///
/// The transport layer is external; peers are only ever addressed by this
/// opaque identifier.
pub type PeerId = B512;

/// Root hash of an empty trie.
pub const EMPTY_ROOT_HASH: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// Keccak256 over empty input, i.e. the code hash of an account without code.
pub const KECCAK_EMPTY: B256 =
    b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// Ommers hash of a block without uncles, `keccak256(rlp([]))`.
pub const EMPTY_OMMERS_HASH: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");
