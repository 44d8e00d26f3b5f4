//! The state transition layer: a journalled overlay over a trie snapshot
//! ([`Txn`]) and the block executor that drives transactions through the EVM
//! ([`Executor`] / [`Transition`]).

mod errors;
mod executor;
mod txn;

pub use errors::ExecError;
pub use executor::{transaction_gas_cost, Executor, GetHashByNumber, GetHashHelper, Transition};
pub use txn::{InsufficientBalance, Txn};

/// Base gas of a transaction that does not create a contract.
pub const TX_GAS: u64 = 21_000;

/// Base gas of a contract-creating transaction, from Homestead on.
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;

/// EIP-170 code size ceiling.
pub const SPURIOUS_DRAGON_MAX_CODE_SIZE: usize = 24_576;
