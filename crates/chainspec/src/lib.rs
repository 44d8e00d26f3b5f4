//! The chain definition: genesis state, fork schedule and network
//! parameters, loaded from a JSON chain file.

mod forks;
mod genesis;

pub use forks::{Fork, Forks, ForksInTime};
pub use genesis::{Genesis, GenesisAccount};

use dogesync_primitives::{Address, Bytes, ChainId};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ChainSpecError {
    #[error("failed to read chain file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse chain file: {0}")]
    Json(#[from] serde_json::Error),
}

/// The top-level chain file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainSpec {
    pub name: String,
    pub genesis: Genesis,
    pub params: Params,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bootnodes: Vec<String>,
}

impl ChainSpec {
    /// Reads and parses a chain file.
    pub fn import(path: impl AsRef<Path>) -> Result<Self, ChainSpecError> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn chain_id(&self) -> ChainId {
        self.params.chain_id
    }

    pub fn forks(&self) -> &Forks {
        &self.params.forks
    }
}

/// Consensus and execution parameters of the chain.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    #[serde(rename = "chainID")]
    pub chain_id: ChainId,
    #[serde(default)]
    pub forks: Forks,
    /// Engine section, opaque to the core (the chain is consensus-finalized).
    #[serde(default)]
    pub engine: serde_json::Value,
    #[serde(default)]
    pub block_gas_target: u64,
    /// System-contract code replacements applied at fork activation heights.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upgrades: Vec<ContractUpgrade>,
}

/// A code replacement the executor applies to a system contract right before
/// executing the activation block.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractUpgrade {
    pub block: u64,
    pub address: Address,
    pub code: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogesync_primitives::U256;

    #[test]
    fn parse_chain_file() {
        let raw = r#"{
            "name": "dogesync-test",
            "genesis": {
                "nonce": "0x0000000000000000",
                "timestamp": 0,
                "gasLimit": 8000000,
                "difficulty": 1,
                "mixHash": "0x0000000000000000000000000000000000000000000000000000000000000000",
                "coinbase": "0x0000000000000000000000000000000000000000",
                "alloc": {
                    "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa": {
                        "balance": "1000000000000000000"
                    }
                }
            },
            "params": {
                "chainID": 2000,
                "forks": {
                    "homestead": 0,
                    "EIP150": 0,
                    "EIP155": 0,
                    "EIP158": 0,
                    "byzantium": 0,
                    "istanbul": 0,
                    "detroit": 100
                },
                "engine": { "ibft": {} }
            }
        }"#;

        let spec: ChainSpec = serde_json::from_str(raw).unwrap();
        assert_eq!(spec.chain_id(), 2000);
        assert_eq!(spec.genesis.gas_limit, 8_000_000);

        let alloc = spec.genesis.alloc.values().next().unwrap();
        assert_eq!(alloc.balance, U256::from(10u64).pow(U256::from(18u64)));

        let forks = spec.forks().at(50);
        assert!(forks.byzantium && forks.istanbul && !forks.detroit);
        assert!(spec.forks().at(100).detroit);
    }
}
