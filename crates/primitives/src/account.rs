use crate::{B256, EMPTY_ROOT_HASH, KECCAK_EMPTY, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// The value stored at a leaf of the account trie.
#[derive(Clone, Copy, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: B256,
    pub code_hash: B256,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: EMPTY_ROOT_HASH,
            code_hash: KECCAK_EMPTY,
        }
    }
}

impl Account {
    pub fn has_code(&self) -> bool {
        self.code_hash != KECCAK_EMPTY && self.code_hash != B256::ZERO
    }

    /// EIP-161 emptiness: no nonce, no balance, no code.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && !self.has_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_rlp::Decodable;

    #[test]
    fn rlp_roundtrip() {
        let account = Account {
            nonce: 7,
            balance: U256::from(1_000_000u64),
            ..Default::default()
        };
        let encoded = alloy_rlp::encode(account);
        assert_eq!(Account::decode(&mut encoded.as_slice()).unwrap(), account);
    }

    #[test]
    fn default_is_empty() {
        assert!(Account::default().is_empty());
        assert!(!Account { nonce: 1, ..Default::default() }.is_empty());
    }
}
