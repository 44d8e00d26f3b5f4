use crate::proto;
use dogesync_primitives::B256;

/// Result alias for peer requests.
pub type RequestResult<T> = Result<T, RequestError>;

/// Error variants that can happen when sending requests to a peer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("closed channel to the peer")]
    ChannelClosed,
    #[error("not connected to the peer")]
    NotConnected,
    #[error("connection to the peer dropped while handling the request")]
    ConnectionDropped,
    #[error("request timed out while awaiting response")]
    Timeout,
    #[error("response exceeds the message size limit")]
    ResourceExhausted,
    #[error("received bad response: {0}")]
    BadResponse(&'static str),
}

impl RequestError {
    /// Whether retrying against the same peer with a smaller request may
    /// succeed.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, RequestError::ResourceExhausted)
    }
}

/// The `V1` request interface one connected peer presents.
///
/// The transport (libp2p stream multiplexing, length-prefixed framing) lives
/// behind this trait.
#[async_trait::async_trait]
pub trait SyncPeerClient: Send + Sync {
    async fn get_current(&self) -> RequestResult<proto::V1Status>;

    async fn get_headers(
        &self,
        request: proto::GetHeadersRequest,
    ) -> RequestResult<proto::HeadersResponse>;

    async fn get_blocks(&self, from: u64, to: u64) -> RequestResult<proto::BlocksResponse>;

    async fn get_bodies(&self, hashes: Vec<B256>) -> RequestResult<proto::BodiesResponse>;

    async fn notify(&self, request: proto::NotifyRequest) -> RequestResult<()>;
}
