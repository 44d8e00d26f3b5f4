//! The network seam: protobuf wire messages, the peer-RPC client interface,
//! peer lifecycle events and the gossip topic fan-out.
//!
//! The libp2p transport itself lives outside the core; it plugs in by
//! implementing [`SyncPeerClient`] per peer stream and feeding a
//! [`Network`] implementation. [`InProcessNetwork`] is the in-memory
//! registry the node and the tests wire against.

mod client;
mod gossip;
pub mod proto;
mod server;

pub use client::{RequestError, RequestResult, SyncPeerClient};
pub use gossip::{GossipError, PubsubDriver, Topic};
pub use server::{InProcessNetwork, Network, PeerEvent};

pub use dogesync_primitives::PeerId;

/// Gossip topic carrying pending transactions.
pub const TXPOOL_TOPIC: &str = "txpool/0.1";

/// Gossip topic carrying freshly written blocks.
pub const BLOCK_TOPIC: &str = "block/0.1";
