//! EVM runtime: one execution frame of bytecode plus the host interface the
//! interpreter calls back into.
//!
//! The interpreter is a fixed dispatch table over a 1024-deep stack with
//! word-granular memory. State access, nested calls and tracing all go
//! through [`Host`]; the executor implements it on top of the journalled
//! state transition.

mod bitmap;
mod contract;
mod dispatch;
mod host;
mod instructions;
mod interpreter;
#[cfg(test)]
mod tests;
mod tracer;

pub use contract::{CallType, Contract};
pub use host::{ExecutionResult, Host, StorageStatus, TxContext};
pub use interpreter::Evm;
pub use tracer::{NoopTracer, ScopeContext, Tracer};

use dogesync_chainspec::ForksInTime;

/// Errors an execution frame can end with.
///
/// `Revert` rolls back the frame but returns data; everything else consumes
/// the frame's remaining gas.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    #[error("out of gas")]
    OutOfGas,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack overflow")]
    StackOverflow,
    #[error("execution reverted")]
    Revert,
    #[error("opcode not found")]
    OpCodeNotFound,
    #[error("write protection")]
    WriteProtection,
    #[error("invalid jump destination")]
    InvalidJump,
    #[error("max call depth exceeded")]
    Depth,
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,
    #[error("contract address collision")]
    ContractAddressCollision,
    #[error("max code size exceeded")]
    MaxCodeSizeExceeded,
    #[error("contract code storage out of gas")]
    CodeStoreOutOfGas,
    #[error("insufficient balance for transfer")]
    InsufficientBalance,
    #[error("gas overflow")]
    GasOverflow,
    #[error("not enough funds")]
    NotEnoughFunds,
    #[error("nonce overflow")]
    NonceOverflow,
    /// A low-level panic inside the interpreter, converted into an error
    /// carrying the machine state at the point of failure.
    #[error("evm panic: {0}")]
    Panic(String),
    #[error("no runtime can execute the contract")]
    NotFound,
}

/// A contract runtime: the EVM itself, or an externally provided table of
/// precompiled contracts.
pub trait Runtime: Send + Sync {
    fn can_run(&self, contract: &Contract, host: &mut dyn Host, forks: &ForksInTime) -> bool;

    fn run(&self, contract: &Contract, host: &mut dyn Host, forks: &ForksInTime)
        -> ExecutionResult;

    fn name(&self) -> &str;
}
