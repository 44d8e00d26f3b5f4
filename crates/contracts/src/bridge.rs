//! Bridge event recognition and decoding.
//!
//! Receipts of calls into the bridge contract carry events that move value
//! in and out of the chain. The executor mirrors them with synthetic balance
//! adjustments outside the EVM, so the decoding here is consensus-critical.

use dogesync_primitives::{keccak256, Address, Log, B256, U256};
use std::sync::LazyLock;

/// `BridgeDeposited(address indexed receiver, uint256 amount)`
pub static BRIDGE_DEPOSITED_EVENT_ID: LazyLock<B256> =
    LazyLock::new(|| keccak256("BridgeDeposited(address,uint256)".as_bytes()));

/// `BridgeWithdrawn(address indexed contract, uint256 amount, uint256 fee)`
pub static BRIDGE_WITHDRAWN_EVENT_ID: LazyLock<B256> =
    LazyLock::new(|| keccak256("BridgeWithdrawn(address,uint256,uint256)".as_bytes()));

/// `BridgeBurned(address indexed sender, uint256 amount)`
pub static BRIDGE_BURNED_EVENT_ID: LazyLock<B256> =
    LazyLock::new(|| keccak256("BridgeBurned(address,uint256)".as_bytes()));

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BridgeLogError {
    #[error("missing indexed address topic")]
    MissingTopic,
    #[error("malformed event data: expected {expected} words, got {got} bytes")]
    MalformedData { expected: usize, got: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeDeposited {
    pub receiver: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeWithdrawn {
    pub contract: Address,
    pub amount: U256,
    pub fee: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeBurned {
    pub sender: Address,
    pub amount: U256,
}

fn indexed_address(log: &Log) -> Result<Address, BridgeLogError> {
    let topic = log.topics.get(1).ok_or(BridgeLogError::MissingTopic)?;
    Ok(Address::from_slice(&topic[12..]))
}

fn data_words<const N: usize>(log: &Log) -> Result<[U256; N], BridgeLogError> {
    if log.data.len() != N * 32 {
        return Err(BridgeLogError::MalformedData { expected: N, got: log.data.len() });
    }

    let mut words = [U256::ZERO; N];
    for (i, word) in words.iter_mut().enumerate() {
        *word = U256::from_be_slice(&log.data[i * 32..(i + 1) * 32]);
    }
    Ok(words)
}

pub fn parse_deposited_log(log: &Log) -> Result<BridgeDeposited, BridgeLogError> {
    let [amount] = data_words(log)?;
    Ok(BridgeDeposited { receiver: indexed_address(log)?, amount })
}

pub fn parse_withdrawn_log(log: &Log) -> Result<BridgeWithdrawn, BridgeLogError> {
    let [amount, fee] = data_words(log)?;
    Ok(BridgeWithdrawn { contract: indexed_address(log)?, amount, fee })
}

pub fn parse_burned_log(log: &Log) -> Result<BridgeBurned, BridgeLogError> {
    let [amount] = data_words(log)?;
    Ok(BridgeBurned { sender: indexed_address(log)?, amount })
}

/// Helpers to build bridge logs, used by fixtures and the bridge tests.
pub mod build {
    use super::*;
    use dogesync_primitives::Bytes;

    fn address_topic(address: Address) -> B256 {
        let mut topic = B256::ZERO;
        topic[12..].copy_from_slice(address.as_slice());
        topic
    }

    fn words(values: &[U256]) -> Bytes {
        let mut data = Vec::with_capacity(values.len() * 32);
        for value in values {
            data.extend_from_slice(&value.to_be_bytes::<32>());
        }
        data.into()
    }

    pub fn deposited(receiver: Address, amount: U256) -> Log {
        Log {
            address: crate::BRIDGE_CONTRACT,
            topics: vec![*BRIDGE_DEPOSITED_EVENT_ID, address_topic(receiver)],
            data: words(&[amount]),
        }
    }

    pub fn withdrawn(contract: Address, amount: U256, fee: U256) -> Log {
        Log {
            address: crate::BRIDGE_CONTRACT,
            topics: vec![*BRIDGE_WITHDRAWN_EVENT_ID, address_topic(contract)],
            data: words(&[amount, fee]),
        }
    }

    pub fn burned(sender: Address, amount: U256) -> Log {
        Log {
            address: crate::BRIDGE_CONTRACT,
            topics: vec![*BRIDGE_BURNED_EVENT_ID, address_topic(sender)],
            data: words(&[amount]),
        }
    }
}
