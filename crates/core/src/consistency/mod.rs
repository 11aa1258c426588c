//! Reconciliation of the remote, the cache, and the sync event channel.

mod consistency_coordinator;

pub use consistency_coordinator::{ConsistencyCoordinator, EventStreamSummary};

#[cfg(test)]
mod tests;
