use dogesync_blockchain::ChainError;
use dogesync_network::RequestError;

/// Sync-engine failures. Peer-class errors drop or rotate the offending
/// peer and are never fatal to the node.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("genesis does not match")]
    MismatchGenesis,
    #[error("common ancestor not found")]
    CommonAncestorNotFound,
    #[error("fork not found")]
    ForkNotFound,
    #[error("failed to read local genesis")]
    LoadLocalGenesisFailed,
    #[error("unexpected more than 1 header in response: {0}")]
    TooManyHeaders(usize),
    #[error("header response is nil")]
    NilHeaderResponse,
    #[error("invalid header sequence")]
    InvalidHeaderSequence,
    #[error("requested body and header mismatch: {headers} headers, {bodies} bodies")]
    HeaderBodyMismatch { headers: usize, bodies: usize },
    #[error("failed to decode difficulty")]
    DecodeDifficulty,
    #[error("timeout waiting for an enqueued block")]
    PopTimeout,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("peer request failed: {0}")]
    Request(#[from] RequestError),
    #[error("failed to decode peer payload: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl SyncError {
    /// Errors that mean the peer is on a different network and must be
    /// disconnected rather than retried.
    pub fn is_different_network(&self) -> bool {
        matches!(
            self,
            SyncError::MismatchGenesis |
                SyncError::CommonAncestorNotFound |
                SyncError::ForkNotFound
        )
    }
}
