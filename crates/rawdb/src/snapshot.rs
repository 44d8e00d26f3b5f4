use dogesync_primitives::{Address, BlockNumber};
use serde::{Deserialize, Serialize};

/// A validator-set vote recorded in a consensus snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// The validator casting the vote.
    pub validator: Address,
    /// The address being voted in or out.
    pub address: Address,
    pub authorize: bool,
}

/// The validator set and pending votes at a given block, persisted per
/// number in MessagePack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub number: BlockNumber,
    pub hash: String,
    /// Votes cast, in chronological order.
    pub votes: Vec<Vote>,
    /// The validator set the snapshot was taken with.
    pub set: Vec<Address>,
}
