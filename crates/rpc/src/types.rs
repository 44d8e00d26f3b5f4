use dogesync_primitives::{
    Address, Block, Bloom, Bytes, Log, Receipt, SealedHeader, Transaction, B256, U256,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Block selector accepted by the `eth_` queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Earliest,
    Number(u64),
}

impl FromStr for BlockTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" | "pending" => Ok(BlockTag::Latest),
            "earliest" => Ok(BlockTag::Earliest),
            other => {
                let raw = other.trim_start_matches("0x");
                u64::from_str_radix(raw, 16)
                    .map(BlockTag::Number)
                    .map_err(|_| format!("invalid block tag: {other}"))
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub number: U256,
    pub hash: B256,
    pub parent_hash: B256,
    pub sha3_uncles: B256,
    pub miner: Address,
    pub state_root: B256,
    pub transactions_root: B256,
    pub receipts_root: B256,
    pub logs_bloom: Bloom,
    pub difficulty: U256,
    pub gas_limit: U256,
    pub gas_used: U256,
    pub timestamp: U256,
    pub extra_data: Bytes,
    /// Transaction hashes, or full objects when requested.
    pub transactions: RpcBlockTransactions,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcBlockTransactions {
    Hashes(Vec<B256>),
    Full(Vec<RpcTransaction>),
}

impl RpcBlock {
    pub fn from_block(block: &Block, full: bool) -> Self {
        let transactions = if full {
            RpcBlockTransactions::Full(
                block.transactions.iter().map(RpcTransaction::from_transaction).collect(),
            )
        } else {
            RpcBlockTransactions::Hashes(
                block.transactions.iter().map(Transaction::hash).collect(),
            )
        };

        Self { transactions, ..Self::from_header(&block.header) }
    }

    pub fn from_header(header: &SealedHeader) -> Self {
        Self {
            number: U256::from(header.number),
            hash: header.hash(),
            parent_hash: header.parent_hash,
            sha3_uncles: header.sha3_uncles,
            miner: header.miner,
            state_root: header.state_root,
            transactions_root: header.tx_root,
            receipts_root: header.receipts_root,
            logs_bloom: header.logs_bloom,
            difficulty: U256::from(header.difficulty),
            gas_limit: U256::from(header.gas_limit),
            gas_used: U256::from(header.gas_used),
            timestamp: U256::from(header.timestamp),
            extra_data: header.extra_data.clone(),
            transactions: RpcBlockTransactions::Hashes(Vec::new()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: B256,
    pub nonce: U256,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub value: U256,
    pub gas: U256,
    pub gas_price: U256,
    pub input: Bytes,
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

impl RpcTransaction {
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            hash: tx.hash(),
            nonce: U256::from(tx.nonce),
            from: tx.from(),
            to: tx.to,
            value: tx.value,
            gas: U256::from(tx.gas),
            gas_price: tx.gas_price,
            input: tx.input.clone(),
            v: U256::from(tx.v),
            r: tx.r,
            s: tx.s,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl RpcLog {
    fn from_log(log: &Log) -> Self {
        Self { address: log.address, topics: log.topics.clone(), data: log.data.clone() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: B256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<B256>,
    pub cumulative_gas_used: U256,
    pub gas_used: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
    pub logs: Vec<RpcLog>,
    pub logs_bloom: Bloom,
}

impl RpcReceipt {
    pub fn from_receipt(receipt: &Receipt) -> Self {
        Self {
            transaction_hash: receipt.tx_hash,
            status: receipt.status.map(|status| U256::from(status as u64)),
            root: receipt.root,
            cumulative_gas_used: U256::from(receipt.cumulative_gas_used),
            gas_used: U256::from(receipt.gas_used),
            contract_address: receipt.contract_address,
            logs: receipt.logs.iter().map(RpcLog::from_log).collect(),
            logs_bloom: receipt.logs_bloom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_tags_parse() {
        assert_eq!("latest".parse::<BlockTag>().unwrap(), BlockTag::Latest);
        assert_eq!("earliest".parse::<BlockTag>().unwrap(), BlockTag::Earliest);
        assert_eq!("0x10".parse::<BlockTag>().unwrap(), BlockTag::Number(16));
        assert!("bogus".parse::<BlockTag>().is_err());
    }

    #[test]
    fn receipt_serializes_to_quantity_fields() {
        let receipt = Receipt {
            status: Some(dogesync_primitives::ReceiptStatus::Success),
            cumulative_gas_used: 21_000,
            gas_used: 21_000,
            tx_hash: B256::repeat_byte(1),
            ..Default::default()
        };

        let json = serde_json::to_value(RpcReceipt::from_receipt(&receipt)).unwrap();
        assert_eq!(json["status"], "0x1");
        assert_eq!(json["cumulativeGasUsed"], "0x5208");
        assert!(json.get("root").is_none());
    }
}
