use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use ledgerdeck_connect::{DEFAULT_CONNECT_API_URL, DEFAULT_POLL_INTERVAL_SECS};
use ledgerdeck_core::events::DEFAULT_CHANGE_FEED_CAPACITY;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8088";
const DEFAULT_DB_PATH: &str = "./ledgerdeck.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: String,
    pub connect_api_url: String,
    pub access_token: Option<String>,
    pub sync_poll_interval: Duration,
    pub event_channel_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let listen_addr = value("LD_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("LD_LISTEN_ADDR must be a socket address such as 127.0.0.1:8088")?;

        let sync_poll_secs = match value("LD_SYNC_POLL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("LD_SYNC_POLL_SECS must be a whole number of seconds")?,
            None => DEFAULT_POLL_INTERVAL_SECS,
        };

        let event_channel_capacity = match value("LD_EVENT_CHANNEL_CAPACITY") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|capacity| *capacity > 0)
                .context("LD_EVENT_CHANNEL_CAPACITY must be a positive integer")?,
            None => DEFAULT_CHANGE_FEED_CAPACITY,
        };

        Ok(Self {
            listen_addr,
            db_path: value("LD_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            connect_api_url: value("LD_CONNECT_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_CONNECT_API_URL.to_string()),
            access_token: value("LD_ACCESS_TOKEN"),
            sync_poll_interval: Duration::from_secs(sync_poll_secs.max(1)),
            event_channel_capacity,
        })
    }
}
