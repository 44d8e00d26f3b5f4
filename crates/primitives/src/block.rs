use crate::{BlockNumber, Header, SealedHeader, Transaction, B256};
use alloy_rlp::{Decodable, Encodable};

/// Ordered transactions belonging to one header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Body {
    pub transactions: Vec<Transaction>,
}

/// A sealed header together with its body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub header: SealedHeader,
    pub transactions: Vec<Transaction>,
    /// Always empty on this chain, kept for wire compatibility.
    pub ommers: Vec<Header>,
}

impl Block {
    pub fn new(header: SealedHeader, transactions: Vec<Transaction>) -> Self {
        Self { header, transactions, ommers: Vec::new() }
    }

    pub fn hash(&self) -> B256 {
        self.header.hash()
    }

    pub fn number(&self) -> BlockNumber {
        self.header.number
    }

    pub fn parent_hash(&self) -> B256 {
        self.header.parent_hash
    }

    pub fn body(&self) -> Body {
        Body { transactions: self.transactions.clone() }
    }
}

impl Encodable for Block {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let payload_length =
            self.header.header().length() + self.transactions.length() + self.ommers.length();
        alloy_rlp::Header { list: true, payload_length }.encode(out);
        self.header.header().encode(out);
        self.transactions.encode(out);
        self.ommers.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length =
            self.header.header().length() + self.transactions.length() + self.ommers.length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for Block {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }

        let inner = Header::decode(buf)?;
        let transactions = Vec::<Transaction>::decode(buf)?;
        let ommers = Vec::<Header>::decode(buf)?;

        Ok(Self { header: inner.seal(), transactions, ommers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::U256;

    #[test]
    fn rlp_roundtrip() {
        let tx = Transaction {
            nonce: 1,
            gas_price: U256::from(2u64),
            gas: 21_000,
            to: Some(crate::Address::repeat_byte(3)),
            value: U256::from(4u64),
            v: 27,
            r: U256::from(5u64),
            s: U256::from(6u64),
            ..Default::default()
        };
        let block =
            Block::new(Header { number: 9, ..Default::default() }.seal(), vec![tx]);

        let encoded = alloy_rlp::encode(&block);
        assert_eq!(encoded.len(), block.length());
        let decoded = Block::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(block, decoded);
        // the decoded header hash is recomputed, not trusted from the wire
        assert_eq!(block.hash(), decoded.hash());
    }
}
