//! The sync engine: finds the best peer, locates the common ancestor and
//! pulls blocks through a bounded three-stage pipeline into the blockchain.

mod errors;
mod peer;
mod service;
mod skeleton;
mod syncer;

pub use errors::SyncError;
pub use peer::{PeerStatus, SyncPeer};
pub use service::SyncService;
pub use skeleton::Skeleton;
pub use syncer::Syncer;
