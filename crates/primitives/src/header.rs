use crate::{
    ibft::{self, IbftExtra},
    keccak256, Address, BlockNumber, Bloom, Bytes, B256, B64, EMPTY_ROOT_HASH,
};
use alloy_rlp::{Encodable, RlpDecodable, RlpEncodable};
use std::ops::Deref;

/// Block header.
///
/// `extra_data` carries the IBFT envelope (proposer vanity, validator set,
/// proposer seal, committed seals); see [`IbftExtra`].
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Header {
    pub parent_hash: B256,
    pub sha3_uncles: B256,
    pub miner: Address,
    pub state_root: B256,
    pub tx_root: B256,
    pub receipts_root: B256,
    pub logs_bloom: Bloom,
    pub difficulty: u64,
    pub number: BlockNumber,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Bytes,
    pub mix_hash: B256,
    pub nonce: B64,
}

impl Header {
    /// Whether the header commits to a non-empty body.
    pub fn has_body(&self) -> bool {
        self.tx_root != EMPTY_ROOT_HASH
    }

    /// Computes the header hash.
    ///
    /// The hash covers every field except the proposer seal and the committed
    /// seals: before hashing, the IBFT extra is replaced by one that carries
    /// only the vanity and the validator set. This keeps the hash stable
    /// before consensus signatures are attached. The `mix_hash` and `nonce`
    /// fields are not part of the hashed payload either.
    pub fn hash_slow(&self) -> B256 {
        let extra_data = match ibft::get_ibft_extra(&self.extra_data) {
            Ok(extra) => ibft::put_ibft_extra_validators(&self.extra_data, &extra.validators),
            // Headers without a decodable envelope (e.g. test fixtures) are
            // hashed over their raw extra data.
            Err(_) => self.extra_data.clone(),
        };

        let mut buf = Vec::new();
        HashPayload { header: self, extra_data: &extra_data }.encode(&mut buf);

        keccak256(&buf)
    }

    /// Locks the header hash, see [`Header::hash_slow`].
    pub fn seal(self) -> SealedHeader {
        let hash = self.hash_slow();
        SealedHeader { header: self, hash }
    }

    /// Extracts the IBFT extra envelope from `extra_data`.
    pub fn ibft_extra(&self) -> Result<IbftExtra, ibft::IbftError> {
        ibft::get_ibft_extra(&self.extra_data)
    }
}

/// The hashed view of a header: seal and committed seals stripped, no
/// `mix_hash`/`nonce`.
struct HashPayload<'a> {
    header: &'a Header,
    extra_data: &'a Bytes,
}

impl Encodable for HashPayload<'_> {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let h = self.header;
        let payload_length = h.parent_hash.length() +
            h.sha3_uncles.length() +
            h.miner.length() +
            h.state_root.length() +
            h.tx_root.length() +
            h.receipts_root.length() +
            h.logs_bloom.length() +
            h.difficulty.length() +
            h.number.length() +
            h.gas_limit.length() +
            h.gas_used.length() +
            h.timestamp.length() +
            self.extra_data.length();

        alloy_rlp::Header { list: true, payload_length }.encode(out);
        h.parent_hash.encode(out);
        h.sha3_uncles.encode(out);
        h.miner.encode(out);
        h.state_root.encode(out);
        h.tx_root.encode(out);
        h.receipts_root.encode(out);
        h.logs_bloom.encode(out);
        h.difficulty.encode(out);
        h.number.encode(out);
        h.gas_limit.encode(out);
        h.gas_used.encode(out);
        h.timestamp.encode(out);
        self.extra_data.encode(out);
    }
}

/// A [`Header`] with its hash computed once and kept alongside.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SealedHeader {
    header: Header,
    hash: B256,
}

impl SealedHeader {
    /// Creates a sealed header from a header and a precomputed hash.
    ///
    /// The caller is responsible for the hash being correct; use
    /// [`Header::seal`] otherwise.
    pub fn new(header: Header, hash: B256) -> Self {
        Self { header, hash }
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Drops the hash and returns the inner header.
    pub fn unseal(self) -> Header {
        self.header
    }
}

impl Deref for SealedHeader {
    type Target = Header;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

impl From<Header> for SealedHeader {
    fn from(header: Header) -> Self {
        header.seal()
    }
}
