//! Signature recovery for transactions and IBFT proposer seals.

use crate::{
    ibft::{self, IbftError},
    keccak256, Address, ChainId, Header, Transaction, B256, U256,
};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, SecretKey, SECP256K1,
};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid signature v value: {0}")]
    InvalidV(u64),
    #[error("signature chain id mismatch: expected {expected}, got {got}")]
    ChainIdMismatch { expected: ChainId, got: ChainId },
    #[error("invalid proposer seal length: {0}")]
    InvalidSealLength(usize),
    #[error(transparent)]
    Ibft(#[from] IbftError),
    #[error(transparent)]
    Secp256k1(#[from] secp256k1::Error),
}

/// Recovers transaction senders under a fixed chain id, with or without
/// EIP-155 replay protection.
#[derive(Clone, Copy, Debug)]
pub struct TxSigner {
    chain_id: ChainId,
    eip155: bool,
}

impl TxSigner {
    pub fn new(chain_id: ChainId, eip155: bool) -> Self {
        Self { chain_id, eip155 }
    }

    /// Recovers the sender and caches it on the transaction.
    pub fn sender(&self, tx: &Transaction) -> Result<Address, SignerError> {
        if let Some(from) = tx.from() {
            return Ok(from);
        }

        let (recovery_id, sighash) = match tx.v {
            27 | 28 => (tx.v - 27, tx.signature_hash(None)),
            v if self.eip155 && v >= 35 => {
                let got = (v - 35) / 2;
                if got != self.chain_id {
                    return Err(SignerError::ChainIdMismatch { expected: self.chain_id, got });
                }
                ((v - 35) % 2, tx.signature_hash(Some(self.chain_id)))
            }
            v => return Err(SignerError::InvalidV(v)),
        };

        let from = recover_address(&compact_signature(tx.r, tx.s), recovery_id as u8, sighash)?;
        tx.set_from(from);

        Ok(from)
    }

    /// Signs a transaction in place. Mostly useful to construct fixtures and
    /// locally submitted transactions.
    pub fn sign(&self, mut tx: Transaction, secret: &SecretKey) -> Result<Transaction, SignerError> {
        let chain_id = self.eip155.then_some(self.chain_id);
        let sighash = tx.signature_hash(chain_id);

        let message = Message::from_digest(sighash.0);
        let (recovery_id, compact) =
            SECP256K1.sign_ecdsa_recoverable(&message, secret).serialize_compact();

        tx.r = U256::from_be_slice(&compact[..32]);
        tx.s = U256::from_be_slice(&compact[32..]);
        tx.v = match chain_id {
            Some(id) => recovery_id.to_i32() as u64 + 35 + id * 2,
            None => recovery_id.to_i32() as u64 + 27,
        };

        Ok(tx)
    }
}

/// Recovers the block proposer from the IBFT seal in the header's extra data.
///
/// The seal signs `keccak256(header_hash)`.
pub fn recover_proposer(header: &Header) -> Result<Address, SignerError> {
    let extra = ibft::get_ibft_extra(&header.extra_data)?;
    if extra.seal.len() != 65 {
        return Err(SignerError::InvalidSealLength(extra.seal.len()));
    }

    let mut recovery_id = extra.seal[64];
    if recovery_id >= 27 {
        recovery_id -= 27;
    }

    let mut compact = [0u8; 64];
    compact.copy_from_slice(&extra.seal[..64]);

    let message = keccak256(header.hash_slow().as_slice());
    recover_address(&compact, recovery_id, message)
}

/// Seals a header with the proposer key, preserving validators and committed
/// seals. Used by fixtures; this node never proposes.
pub fn seal_header(header: Header, secret: &SecretKey) -> Result<Header, SignerError> {
    let mut extra = ibft::get_ibft_extra(&header.extra_data)?;

    let digest = keccak256(header.hash_slow().as_slice());
    let message = Message::from_digest(digest.0);
    let (recovery_id, compact) =
        SECP256K1.sign_ecdsa_recoverable(&message, secret).serialize_compact();

    let mut seal = compact.to_vec();
    seal.push(recovery_id.to_i32() as u8);
    extra.seal = seal.into();

    let mut sealed = header;
    sealed.extra_data = ibft::put_ibft_extra(&sealed.extra_data, &extra);
    Ok(sealed)
}

/// The address a secret key signs for.
pub fn address_of(secret: &SecretKey) -> Address {
    public_key_to_address(&secret.public_key(SECP256K1))
}

/// Contract address for a `CREATE` by `sender` at `nonce`:
/// `keccak256(rlp([sender, nonce]))[12..]`.
pub fn create_address(sender: Address, nonce: u64) -> Address {
    use alloy_rlp::Encodable;

    let payload_length = sender.length() + nonce.length();
    let mut buf = Vec::with_capacity(payload_length + 1);
    alloy_rlp::Header { list: true, payload_length }.encode(&mut buf);
    sender.encode(&mut buf);
    nonce.encode(&mut buf);

    Address::from_slice(&keccak256(&buf)[12..])
}

/// Contract address for a `CREATE2`:
/// `keccak256(0xff ++ sender ++ salt ++ keccak256(init_code))[12..]`.
pub fn create2_address(sender: Address, salt: B256, init_code_hash: B256) -> Address {
    let mut buf = Vec::with_capacity(1 + 20 + 32 + 32);
    buf.push(0xff);
    buf.extend_from_slice(sender.as_slice());
    buf.extend_from_slice(salt.as_slice());
    buf.extend_from_slice(init_code_hash.as_slice());

    Address::from_slice(&keccak256(&buf)[12..])
}

fn compact_signature(r: U256, s: U256) -> [u8; 64] {
    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&r.to_be_bytes::<32>());
    compact[32..].copy_from_slice(&s.to_be_bytes::<32>());
    compact
}

fn recover_address(
    compact: &[u8; 64],
    recovery_id: u8,
    digest: B256,
) -> Result<Address, SignerError> {
    let signature =
        RecoverableSignature::from_compact(compact, RecoveryId::from_i32(recovery_id as i32)?)?;
    let public_key = SECP256K1.recover_ecdsa(&Message::from_digest(digest.0), &signature)?;

    Ok(public_key_to_address(&public_key))
}

fn public_key_to_address(public_key: &PublicKey) -> Address {
    // drop the 0x04 uncompressed marker
    let hash = keccak256(&public_key.serialize_uncompressed()[1..]);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ibft, Bytes};

    fn secret() -> SecretKey {
        SecretKey::from_slice(&[0x11u8; 32]).unwrap()
    }

    fn transfer() -> Transaction {
        Transaction {
            nonce: 0,
            gas_price: U256::from(1u64),
            gas: 21_000,
            to: Some(Address::repeat_byte(0xbb)),
            value: U256::from(1u64),
            ..Default::default()
        }
    }

    #[test]
    fn sign_and_recover_eip155() {
        let signer = TxSigner::new(2000, true);
        let tx = signer.sign(transfer(), &secret()).unwrap();
        assert_eq!(tx.v, 35 + 2000 * 2 + (tx.v - 35) % 2);
        assert_eq!(signer.sender(&tx).unwrap(), address_of(&secret()));
    }

    #[test]
    fn sign_and_recover_legacy() {
        let signer = TxSigner::new(2000, false);
        let tx = signer.sign(transfer(), &secret()).unwrap();
        assert!(tx.v == 27 || tx.v == 28);
        assert_eq!(signer.sender(&tx).unwrap(), address_of(&secret()));
    }

    #[test]
    fn wrong_chain_id_is_rejected() {
        let tx = TxSigner::new(2000, true).sign(transfer(), &secret()).unwrap();
        let other = TxSigner::new(2001, true);
        assert!(matches!(
            other.sender(&tx),
            Err(SignerError::ChainIdMismatch { expected: 2001, got: 2000 })
        ));
    }

    #[test]
    fn seal_and_recover_proposer() {
        let mut header = Header { number: 5, ..Default::default() };
        header.extra_data =
            ibft::put_ibft_extra_validators(&Bytes::new(), &[address_of(&secret())]);

        let sealed = seal_header(header.clone(), &secret()).unwrap();
        assert_eq!(recover_proposer(&sealed).unwrap(), address_of(&secret()));
        // sealing does not move the header hash
        assert_eq!(header.hash_slow(), sealed.hash_slow());
    }

    #[test]
    fn create_addresses_are_deterministic() {
        let a = create_address(Address::repeat_byte(1), 0);
        let b = create_address(Address::repeat_byte(1), 1);
        assert_ne!(a, b);

        let salt = B256::repeat_byte(9);
        let code_hash = keccak256([0x60, 0x00]);
        assert_eq!(
            create2_address(Address::repeat_byte(1), salt, code_hash),
            create2_address(Address::repeat_byte(1), salt, code_hash),
        );
    }
}
