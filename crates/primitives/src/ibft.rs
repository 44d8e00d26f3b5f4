use crate::{Address, Bytes};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};

/// Number of bytes reserved for the proposer vanity at the start of
/// `extra_data`.
pub const IBFT_EXTRA_VANITY: usize = 32;

/// The IBFT envelope carried in the trailing part of a header's `extra_data`.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct IbftExtra {
    /// The validator set active for this block.
    pub validators: Vec<Address>,
    /// The proposer seal over the header hash.
    pub seal: Bytes,
    /// Seals of the validators that committed the block.
    pub committed_seals: Vec<Bytes>,
}

#[derive(Debug, thiserror::Error)]
pub enum IbftError {
    #[error("wrong extra size: {0}")]
    WrongExtraSize(usize),
    #[error("failed to decode ibft extra: {0}")]
    Rlp(#[from] alloy_rlp::Error),
}

/// Decodes the IBFT envelope from raw header extra data.
pub fn get_ibft_extra(extra_data: &[u8]) -> Result<IbftExtra, IbftError> {
    if extra_data.len() < IBFT_EXTRA_VANITY {
        return Err(IbftError::WrongExtraSize(extra_data.len()));
    }

    let mut buf = &extra_data[IBFT_EXTRA_VANITY..];
    Ok(IbftExtra::decode(&mut buf)?)
}

/// Re-encodes extra data with the given envelope, preserving (and
/// zero-padding) the vanity prefix of `prev_extra`.
pub fn put_ibft_extra(prev_extra: &[u8], extra: &IbftExtra) -> Bytes {
    let mut out = vec![0u8; IBFT_EXTRA_VANITY];
    let vanity = prev_extra.len().min(IBFT_EXTRA_VANITY);
    out[..vanity].copy_from_slice(&prev_extra[..vanity]);

    out.extend_from_slice(&alloy_rlp::encode(extra));
    out.into()
}

/// Re-encodes extra data keeping only the vanity and the validator set, with
/// empty seal and committed seals. This is the form the header hash is
/// computed over.
pub fn put_ibft_extra_validators(prev_extra: &[u8], validators: &[Address]) -> Bytes {
    let extra = IbftExtra {
        validators: validators.to_vec(),
        seal: Bytes::new(),
        committed_seals: Vec::new(),
    };

    put_ibft_extra(prev_extra, &extra)
}
