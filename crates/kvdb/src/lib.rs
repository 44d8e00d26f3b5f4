//! Namespaced embedded key-value store.
//!
//! A single MDBX environment partitioned into named sub-databases (DBIs),
//! fronted by a two-level write-back cache: writes land in a *main* cache,
//! get demoted to a *frozen* cache once the main cache grows past its
//! threshold, and a background worker drains the frozen cache into the
//! backend in one write transaction. See [`MdbxDb`].

mod batch;
mod mdbx;
mod mem;

pub use batch::MdbxBatch;
pub use mdbx::MdbxDb;
pub use mem::MemDb;

/// Trie nodes, content-addressed.
pub const TRIE_DBI: &str = "trie";
/// Block bodies: header hash to concatenated tx hashes.
pub const BLOCK_DBI: &str = "block";
/// Headers by hash.
pub const HEAD_DBI: &str = "head";
/// Head pointer and head number.
pub const ASSIST_DBI: &str = "assist";
/// Canonical index: number to header hash.
pub const NUMHASH_DBI: &str = "numhash";
/// Transactions by hash.
pub const TXES_DBI: &str = "txes";
/// Receipts by tx hash.
pub const RECEIPTS_DBI: &str = "receipts";
/// Cumulative difficulty by header hash.
pub const TD_DBI: &str = "td";
/// Consensus snapshots by number.
pub const SNAP_DBI: &str = "snap";
/// Contract code by code hash.
pub const CODE_DBI: &str = "code";

/// Every DBI the store opens on startup. The names are stable and are
/// pairwise prefix-free, so a single `dbi-name ‖ key` map can hold cached
/// entries for all of them.
pub const DBIS: [&str; 10] = [
    TRIE_DBI, BLOCK_DBI, HEAD_DBI, ASSIST_DBI, NUMHASH_DBI, TXES_DBI, RECEIPTS_DBI, TD_DBI,
    SNAP_DBI, CODE_DBI,
];

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("store is closed")]
    Closed,
    #[error("unknown dbi: {0}")]
    UnknownDbi(String),
    #[error("mdbx error: {0}")]
    Backend(#[from] ::libmdbx::Error),
}

/// A write batch that commits atomically.
pub trait WriteBatch: Send {
    fn set(&mut self, dbi: &'static str, key: &[u8], value: &[u8]);
    fn write(self: Box<Self>) -> Result<(), KvError>;
}

/// The store interface the rest of the node programs against.
///
/// `get` models absence as `Ok(None)`; only real backend failures surface as
/// errors. `set` may buffer in memory until `sync` is called.
pub trait Database: Send + Sync {
    fn get(&self, dbi: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    fn set(&self, dbi: &'static str, key: &[u8], value: Vec<u8>) -> Result<(), KvError>;

    fn remove(&self, dbi: &'static str, key: &[u8]) -> Result<(), KvError>;

    fn batch(&self) -> Box<dyn WriteBatch + '_>;

    /// Forces durability of all buffered writes.
    fn sync(&self) -> Result<(), KvError>;

    /// Flushes, syncs and releases the environment.
    fn close(&self) -> Result<(), KvError>;
}
