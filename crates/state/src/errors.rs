use dogesync_primitives::crypto::SignerError;
use dogesync_trie::TrieError;

/// Errors raised while applying transactions. Any of these surfacing during
/// block re-execution rejects the whole block.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("nonce too low: actual {actual}, wanted {wanted}")]
    NonceTooLow { actual: u64, wanted: u64 },
    #[error("nonce too high: actual {actual}, wanted {wanted}")]
    NonceTooHigh { actual: u64, wanted: u64 },
    #[error("not enough funds to cover gas costs")]
    NotEnoughFundsForGas,
    #[error("gas limit reached in the pool")]
    BlockLimitReached,
    #[error("overflow in intrinsic gas calculation")]
    IntrinsicGasOverflow,
    #[error("not enough gas supplied for intrinsic gas costs")]
    NotEnoughIntrinsicGas,
    #[error("not enough funds for transfer with given value")]
    NotEnoughFunds,
    #[error("all gas used")]
    AllGasUsed,
    #[error("execution stop")]
    ExecutionStop,
    #[error("failed to recover sender: {0}")]
    Signer(#[from] SignerError),
    #[error("bridge log error: {0}")]
    Bridge(#[from] dogesync_contracts::bridge::BridgeLogError),
    #[error(transparent)]
    Trie(#[from] TrieError),
}
