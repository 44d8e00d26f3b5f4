use crate::{Address, Bloom, BloomInput, Bytes, TxHash, B256};
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable, EMPTY_STRING_CODE};

/// Outcome flag of a transaction, part of the receipt after Byzantium.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptStatus {
    Failed = 0,
    Success = 1,
}

/// A log emitted during execution.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Receipt of one executed transaction.
///
/// Exactly one of `root` (pre-Byzantium intermediate state root) and
/// `status` is set. The consensus fields are the first four; the rest is
/// lookup context the node persists alongside.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
    pub root: Option<B256>,
    pub status: Option<ReceiptStatus>,
    pub cumulative_gas_used: u64,
    pub logs_bloom: Bloom,
    pub logs: Vec<Log>,

    pub gas_used: u64,
    pub contract_address: Option<Address>,
    pub tx_hash: TxHash,
}

impl Receipt {
    pub fn set_status(&mut self, status: ReceiptStatus) {
        self.status = Some(status);
        self.root = None;
    }

    pub fn success(&self) -> bool {
        self.status == Some(ReceiptStatus::Success)
    }

    /// RLP of the four consensus fields; the receipts root is computed over
    /// these encodings.
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let payload_length = self.outcome_length() +
            self.cumulative_gas_used.length() +
            self.logs_bloom.length() +
            self.logs.length();
        alloy_rlp::Header { list: true, payload_length }.encode(&mut buf);
        self.encode_outcome(&mut buf);
        self.cumulative_gas_used.encode(&mut buf);
        self.logs_bloom.encode(&mut buf);
        self.logs.encode(&mut buf);
        buf
    }

    fn outcome_length(&self) -> usize {
        match (&self.root, &self.status) {
            (Some(root), _) => root.length(),
            (None, Some(status)) => (*status as u64).length(),
            (None, None) => 1,
        }
    }

    fn encode_outcome(&self, out: &mut dyn alloy_rlp::BufMut) {
        match (&self.root, &self.status) {
            (Some(root), _) => root.encode(out),
            (None, Some(status)) => (*status as u64).encode(out),
            (None, None) => out.put_u8(EMPTY_STRING_CODE),
        }
    }
}

impl Encodable for Receipt {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let contract_length = match &self.contract_address {
            Some(addr) => addr.length(),
            None => 1,
        };
        let payload_length = self.outcome_length() +
            self.cumulative_gas_used.length() +
            self.logs_bloom.length() +
            self.logs.length() +
            self.gas_used.length() +
            contract_length +
            self.tx_hash.length();

        alloy_rlp::Header { list: true, payload_length }.encode(out);
        self.encode_outcome(out);
        self.cumulative_gas_used.encode(out);
        self.logs_bloom.encode(out);
        self.logs.encode(out);
        self.gas_used.encode(out);
        match &self.contract_address {
            Some(addr) => addr.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }
        self.tx_hash.encode(out);
    }
}

impl Decodable for Receipt {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }

        // A 32-byte string is an intermediate root, anything shorter a status.
        let (root, status) = if buf.first() == Some(&(EMPTY_STRING_CODE + 32)) {
            (Some(B256::decode(buf)?), None)
        } else {
            let status = match u64::decode(buf)? {
                0 => ReceiptStatus::Failed,
                1 => ReceiptStatus::Success,
                _ => return Err(alloy_rlp::Error::Custom("invalid receipt status")),
            };
            (None, Some(status))
        };

        let cumulative_gas_used = u64::decode(buf)?;
        let logs_bloom = Bloom::decode(buf)?;
        let logs = Vec::<Log>::decode(buf)?;
        let gas_used = u64::decode(buf)?;
        let contract_address = if buf.first() == Some(&EMPTY_STRING_CODE) {
            *buf = &buf[1..];
            None
        } else {
            Some(Address::decode(buf)?)
        };
        let tx_hash = TxHash::decode(buf)?;

        Ok(Self {
            root,
            status,
            cumulative_gas_used,
            logs_bloom,
            logs,
            gas_used,
            contract_address,
            tx_hash,
        })
    }
}

/// Builds the logs bloom over a set of logs: every log address and every
/// topic is accrued.
pub fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a Log>) -> Bloom {
    let mut bloom = Bloom::default();
    for log in logs {
        bloom.accrue(BloomInput::Raw(log.address.as_slice()));
        for topic in &log.topics {
            bloom.accrue(BloomInput::Raw(topic.as_slice()));
        }
    }
    bloom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> Log {
        Log {
            address: Address::repeat_byte(0x11),
            topics: vec![B256::repeat_byte(0x22), B256::repeat_byte(0x33)],
            data: Bytes::from(vec![1, 2, 3]),
        }
    }

    #[test]
    fn status_receipt_roundtrip() {
        let logs = vec![sample_log()];
        let receipt = Receipt {
            status: Some(ReceiptStatus::Success),
            cumulative_gas_used: 21_000,
            logs_bloom: logs_bloom(&logs),
            logs,
            gas_used: 21_000,
            contract_address: None,
            tx_hash: B256::repeat_byte(0x44),
            ..Default::default()
        };

        let encoded = alloy_rlp::encode(&receipt);
        let decoded = Receipt::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(receipt, decoded);
    }

    #[test]
    fn root_receipt_roundtrip() {
        let receipt = Receipt {
            root: Some(B256::repeat_byte(0x55)),
            cumulative_gas_used: 40_000,
            gas_used: 19_000,
            contract_address: Some(Address::repeat_byte(0x66)),
            tx_hash: B256::repeat_byte(0x77),
            ..Default::default()
        };

        let encoded = alloy_rlp::encode(&receipt);
        let decoded = Receipt::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(receipt, decoded);
    }

    #[test]
    fn bloom_contains_log_entries() {
        let log = sample_log();
        let bloom = logs_bloom(std::iter::once(&log));
        assert!(bloom.contains_input(BloomInput::Raw(log.address.as_slice())));
        assert!(bloom.contains_input(BloomInput::Raw(log.topics[0].as_slice())));
        assert!(!bloom.contains_input(BloomInput::Raw(B256::repeat_byte(0x99).as_slice())));
    }
}
