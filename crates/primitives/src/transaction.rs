use crate::{keccak256, Address, Bytes, ChainId, TxHash, B256, U256};
use alloy_rlp::{Decodable, Encodable, EMPTY_STRING_CODE};
use std::{sync::OnceLock, time::SystemTime};

/// A signed legacy transaction.
///
/// The hash and the recovered sender are computed lazily and cached; neither
/// takes part in the consensus encoding, and neither does `received`, which
/// only breaks price ties when the mempool orders pending transactions.
#[derive(Clone, Debug, Default)]
pub struct Transaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas: u64,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub v: u64,
    pub r: U256,
    pub s: U256,

    pub(crate) hash: OnceLock<TxHash>,
    pub(crate) from: OnceLock<Address>,

    /// Time at which the node first saw the transaction.
    pub received: Option<SystemTime>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.nonce == other.nonce &&
            self.gas_price == other.gas_price &&
            self.gas == other.gas &&
            self.to == other.to &&
            self.value == other.value &&
            self.input == other.input &&
            self.v == other.v &&
            self.r == other.r &&
            self.s == other.s
    }
}

impl Eq for Transaction {}

impl Transaction {
    /// Whether this transaction creates a contract.
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    /// The transaction hash, `keccak256(rlp(tx))`.
    pub fn hash(&self) -> TxHash {
        *self.hash.get_or_init(|| keccak256(alloy_rlp::encode(self)))
    }

    /// The cached sender, if it has been recovered before.
    pub fn from(&self) -> Option<Address> {
        self.from.get().copied()
    }

    /// Caches the recovered sender. A no-op if one is already cached.
    pub fn set_from(&self, from: Address) {
        let _ = self.from.set(from);
    }

    /// `gas * gas_price + value`, the maximum the sender can be charged.
    pub fn cost(&self) -> U256 {
        self.gas_price.saturating_mul(U256::from(self.gas)).saturating_add(self.value)
    }

    /// Whether the transaction alone cannot fit the block.
    pub fn exceeds_block_gas_limit(&self, block_gas_limit: u64) -> bool {
        self.gas > block_gas_limit
    }

    /// The hash the signature commits to. EIP-155 replay protection appends
    /// `[chain_id, 0, 0]` to the unsigned payload.
    pub fn signature_hash(&self, chain_id: Option<ChainId>) -> B256 {
        let mut buf = Vec::new();
        UnsignedPayload { tx: self, chain_id }.encode(&mut buf);
        keccak256(&buf)
    }
}

fn to_length(to: &Option<Address>) -> usize {
    match to {
        Some(addr) => addr.length(),
        None => 1,
    }
}

fn encode_to(to: &Option<Address>, out: &mut dyn alloy_rlp::BufMut) {
    match to {
        Some(addr) => addr.encode(out),
        None => out.put_u8(EMPTY_STRING_CODE),
    }
}

impl Encodable for Transaction {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let payload_length = self.fields_length() + self.v.length() + self.r.length() + self.s.length();
        alloy_rlp::Header { list: true, payload_length }.encode(out);
        self.encode_fields(out);
        self.v.encode(out);
        self.r.encode(out);
        self.s.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.fields_length() + self.v.length() + self.r.length() + self.s.length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Transaction {
    fn fields_length(&self) -> usize {
        self.nonce.length() +
            self.gas_price.length() +
            self.gas.length() +
            to_length(&self.to) +
            self.value.length() +
            self.input.length()
    }

    fn encode_fields(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas.encode(out);
        encode_to(&self.to, out);
        self.value.encode(out);
        self.input.encode(out);
    }
}

impl Decodable for Transaction {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let started_len = buf.len();

        let nonce = u64::decode(buf)?;
        let gas_price = U256::decode(buf)?;
        let gas = u64::decode(buf)?;
        let to = if buf.first() == Some(&EMPTY_STRING_CODE) {
            *buf = &buf[1..];
            None
        } else {
            Some(Address::decode(buf)?)
        };
        let value = U256::decode(buf)?;
        let input = Bytes::decode(buf)?;
        let v = u64::decode(buf)?;
        let r = U256::decode(buf)?;
        let s = U256::decode(buf)?;

        let consumed = started_len - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            });
        }

        Ok(Self { nonce, gas_price, gas, to, value, input, v, r, s, ..Default::default() })
    }
}

/// The unsigned view of a transaction, as the signature hash sees it.
struct UnsignedPayload<'a> {
    tx: &'a Transaction,
    chain_id: Option<ChainId>,
}

impl Encodable for UnsignedPayload<'_> {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let mut payload_length = self.tx.fields_length();
        if let Some(chain_id) = self.chain_id {
            payload_length += chain_id.length() + 2;
        }

        alloy_rlp::Header { list: true, payload_length }.encode(out);
        self.tx.encode_fields(out);
        if let Some(chain_id) = self.chain_id {
            chain_id.encode(out);
            0u8.encode(out);
            0u8.encode(out);
        }
    }
}
