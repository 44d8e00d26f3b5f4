use dogesync_primitives::{Address, Bytes, B256, EMPTY_ROOT_HASH, KECCAK_EMPTY, U256};

/// One account's accumulated modifications, as produced by a state
/// transition commit and consumed by [`Trie::commit`](crate::Trie::commit).
#[derive(Clone, Debug)]
pub struct StateObject {
    pub address: Address,
    pub nonce: u64,
    pub balance: U256,
    /// The storage root the object's slots start from.
    pub root: B256,
    pub code_hash: B256,
    /// New code to persist, if the account was (re)deployed.
    pub code: Option<Bytes>,
    /// Dirty storage slots; a zero value deletes the slot.
    pub storage: Vec<(B256, B256)>,
    /// Account removal (suicide or post-EIP158 empty touch).
    pub deleted: bool,
}

impl StateObject {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            nonce: 0,
            balance: U256::ZERO,
            root: EMPTY_ROOT_HASH,
            code_hash: KECCAK_EMPTY,
            code: None,
            storage: Vec::new(),
            deleted: false,
        }
    }
}
