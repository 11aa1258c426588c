//! Client-state core for the Ledgerdeck dashboard.
//!
//! Keeps what the UI shows consistent while the remote is slow, the cache is
//! local, and sync status arrives over an unreliable channel.

pub mod consistency;
pub mod errors;
pub mod events;
pub mod settings;
pub mod sync_jobs;

#[cfg(test)]
mod test_support;

pub use consistency::{ConsistencyCoordinator, EventStreamSummary};
pub use errors::{CacheError, Error, RemoteError, Result};
pub use events::{ChangeFeed, StateEvent};
