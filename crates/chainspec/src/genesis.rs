use dogesync_primitives::{
    Address, Bytes, Header, B256, B64, EMPTY_OMMERS_HASH, EMPTY_ROOT_HASH, U256,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header fields and the allocated state of the genesis block.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genesis {
    #[serde(default)]
    pub nonce: B64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub extra_data: Bytes,
    pub gas_limit: u64,
    pub difficulty: u64,
    #[serde(default)]
    pub mix_hash: B256,
    #[serde(default)]
    pub coinbase: Address,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alloc: BTreeMap<Address, GenesisAccount>,

    // fixture-only overrides
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub gas_used: u64,
    #[serde(default)]
    pub parent_hash: B256,
}

impl Genesis {
    /// Builds the genesis header around the state root the executor derived
    /// from `alloc`.
    pub fn header(&self, state_root: B256) -> Header {
        Header {
            parent_hash: self.parent_hash,
            sha3_uncles: EMPTY_OMMERS_HASH,
            miner: self.coinbase,
            state_root,
            tx_root: EMPTY_ROOT_HASH,
            receipts_root: EMPTY_ROOT_HASH,
            logs_bloom: Default::default(),
            difficulty: self.difficulty,
            number: self.number,
            gas_limit: self.gas_limit,
            gas_used: self.gas_used,
            timestamp: self.timestamp,
            extra_data: self.extra_data.clone(),
            mix_hash: self.mix_hash,
            nonce: self.nonce,
        }
    }
}

/// An account in the genesis state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisAccount {
    #[serde(default)]
    pub code: Bytes,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub storage: BTreeMap<B256, B256>,
    #[serde(default)]
    pub balance: U256,
    #[serde(default)]
    pub nonce: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_stable() {
        let genesis = Genesis {
            gas_limit: 8_000_000,
            difficulty: 1,
            timestamp: 1_700_000_000,
            ..Default::default()
        };

        let root = B256::repeat_byte(0x42);
        let a = genesis.header(root).seal();
        let b = genesis.header(root).seal();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.state_root, root);
        assert_eq!(a.tx_root, EMPTY_ROOT_HASH);
    }
}
