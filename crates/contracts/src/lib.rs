//! Well-known system contracts.
//!
//! The chain reserves a handful of addresses for consensus-level contracts:
//! the validator set (stake deposits and slashing), the bridge (transfers
//! from and to the parent chain) and the vault (bridge fee sink). The core
//! never deploys these; it only recognizes transactions and logs that target
//! them.

pub mod bridge;
pub mod validatorset;

use dogesync_primitives::{address, Address};

/// The validator-set contract, target of deposit and slash system
/// transactions.
pub const VALIDATOR_SET_CONTRACT: Address = address!("0000000000000000000000000000000000001001");

/// The bridge contract; its logs trigger synthetic balance adjustments.
pub const BRIDGE_CONTRACT: Address = address!("0000000000000000000000000000000000001002");

/// The vault contract collecting bridge withdrawal fees.
pub const VAULT_CONTRACT: Address = address!("0000000000000000000000000000000000001003");
