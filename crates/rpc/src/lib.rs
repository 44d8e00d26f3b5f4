//! Read-only JSON-RPC frontend.
//!
//! A small `eth_` namespace over the blockchain's public getters. Internal
//! errors are translated into JSON-RPC errors with a code and a human
//! string; nothing here can mutate the chain.

mod cors;
mod eth;
mod types;

pub use eth::{EthApiImpl, EthApiServer};
pub use types::{BlockTag, RpcBlock, RpcBlockTransactions, RpcLog, RpcReceipt, RpcTransaction};

use jsonrpsee::server::{Server, ServerHandle};
use std::net::SocketAddr;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("failed to bind json-rpc server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Starts the HTTP JSON-RPC server.
pub async fn start_rpc_server(
    addr: SocketAddr,
    allowed_origins: &[String],
    api: EthApiImpl,
) -> Result<ServerHandle, RpcError> {
    let cors = cors::layer(allowed_origins);

    let middleware = tower::ServiceBuilder::new().layer(cors);
    let server = Server::builder().set_http_middleware(middleware).build(addr).await?;

    info!(target: "rpc", %addr, "json-rpc server started");
    Ok(server.start(api.into_rpc()))
}
