//! Typed accessors over the chain's persistent schema.
//!
//! Thin serializers between the domain types and the namespaced byte store:
//! one DBI per record family, RLP for consensus objects, varints for numbers
//! and MessagePack for consensus snapshots. Callers batch at the block level;
//! every writer here issues at most one batch.

mod chain;
mod snapshot;
mod varint;

pub use chain::*;
pub use snapshot::{Snapshot, Vote};
pub use varint::{decode_varint, encode_varint};

use dogesync_kvdb::KvError;

#[derive(Debug, thiserror::Error)]
pub enum RawDbError {
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error("failed to decode stored {what}: {err}")]
    Rlp { what: &'static str, err: alloy_rlp::Error },
    #[error("stored body length {0} is not a multiple of 32")]
    CorruptBody(usize),
    #[error("failed to decode stored varint")]
    CorruptVarint,
    #[error("failed to decode stored snapshot: {0}")]
    Snapshot(#[from] rmp_serde::decode::Error),
    #[error("failed to encode snapshot: {0}")]
    SnapshotEncode(#[from] rmp_serde::encode::Error),
}

fn rlp_err(what: &'static str) -> impl FnOnce(alloy_rlp::Error) -> RawDbError {
    move |err| RawDbError::Rlp { what, err }
}
