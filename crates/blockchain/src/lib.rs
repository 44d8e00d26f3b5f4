//! The canonical chain: verifies finalized blocks, re-executes their bodies,
//! persists them and owns the current head.

mod blockchain;
mod errors;
mod events;

pub use blockchain::{BlockResult, Blockchain};
pub use errors::ChainError;
pub use events::{Event, EventType, Subscription};
