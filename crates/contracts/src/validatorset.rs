//! Recognition of validator-set system transactions.
//!
//! After the Detroit fork the block proposer appends `deposit` and `slash`
//! calls to its own blocks. They are distinguished purely by the 4-byte
//! method selector of the call input.

use dogesync_primitives::{keccak256, Transaction};
use std::sync::LazyLock;

/// Gas limit granted to validator-set queries.
pub const SYSTEM_TRANSACTION_GAS_LIMIT: u64 = 1_000_000;

static DEPOSIT_SELECTOR: LazyLock<[u8; 4]> = LazyLock::new(|| selector("deposit(address)"));
static SLASH_SELECTOR: LazyLock<[u8; 4]> = LazyLock::new(|| selector("slash(address)"));

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn has_selector(input: &[u8], selector: &[u8; 4]) -> bool {
    input.len() >= 4 && &input[..4] == selector
}

/// Whether the call input selects the `deposit` method.
pub fn is_deposit_input(input: &[u8]) -> bool {
    has_selector(input, &DEPOSIT_SELECTOR)
}

/// Whether the call input selects the `slash` method.
pub fn is_slash_input(input: &[u8]) -> bool {
    has_selector(input, &SLASH_SELECTOR)
}

/// Whether the transaction targets the validator set with a deposit call.
pub fn is_deposit_tx(tx: &Transaction) -> bool {
    tx.to == Some(super::VALIDATOR_SET_CONTRACT) && is_deposit_input(&tx.input)
}

/// Whether the transaction targets the validator set with a slash call.
pub fn is_slash_tx(tx: &Transaction) -> bool {
    tx.to == Some(super::VALIDATOR_SET_CONTRACT) && is_slash_input(&tx.input)
}

/// ABI input for a `deposit(address)` call.
pub fn deposit_input(validator: dogesync_primitives::Address) -> Vec<u8> {
    encode_address_call(&DEPOSIT_SELECTOR, validator)
}

/// ABI input for a `slash(address)` call.
pub fn slash_input(validator: dogesync_primitives::Address) -> Vec<u8> {
    encode_address_call(&SLASH_SELECTOR, validator)
}

fn encode_address_call(selector: &[u8; 4], address: dogesync_primitives::Address) -> Vec<u8> {
    let mut input = Vec::with_capacity(4 + 32);
    input.extend_from_slice(selector);
    input.extend_from_slice(&[0u8; 12]);
    input.extend_from_slice(address.as_slice());
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogesync_primitives::Address;

    #[test]
    fn selectors_match_inputs() {
        let validator = Address::repeat_byte(0x11);
        assert!(is_deposit_input(&deposit_input(validator)));
        assert!(is_slash_input(&slash_input(validator)));
        assert!(!is_deposit_input(&slash_input(validator)));
        assert!(!is_slash_input(&[0u8; 3]));
    }

    #[test]
    fn target_contract_is_checked() {
        let mut tx = Transaction {
            to: Some(super::super::VALIDATOR_SET_CONTRACT),
            input: deposit_input(Address::repeat_byte(1)).into(),
            ..Default::default()
        };
        assert!(is_deposit_tx(&tx));

        tx.to = Some(Address::repeat_byte(0x99));
        assert!(!is_deposit_tx(&tx));
    }
}
