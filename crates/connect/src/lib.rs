//! Client for the Ledgerdeck service: the authoritative group settings API and the
//! sync job status feed.

pub mod client;
pub mod config;
pub mod error;
pub mod poller;
pub mod types;

pub use client::ConnectClient;
pub use config::{ConnectConfig, DEFAULT_CONNECT_API_URL};
pub use error::{ApiRetryClass, ConnectError, Result};
pub use poller::{backoff_seconds, SyncEventPoller, SyncEventSource, DEFAULT_POLL_INTERVAL_SECS};
