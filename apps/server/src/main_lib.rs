use std::sync::Arc;

use anyhow::Context;
use ledgerdeck_connect::{ConnectClient, ConnectConfig, SyncEventPoller};
use ledgerdeck_core::{ChangeFeed, ConsistencyCoordinator};
use ledgerdeck_storage_sqlite::{create_pool, init, run_migrations, SqliteSettingsCache};
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

pub struct AppState {
    pub coordinator: Arc<ConsistencyCoordinator>,
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn connect_config(config: &Config) -> ConnectConfig {
    let connect = ConnectConfig::new(&config.connect_api_url);
    match &config.access_token {
        Some(token) => connect.with_access_token(token.clone()),
        None => connect,
    }
}

/// Opens the database and wires the cache, the service client, and the coordinator.
pub fn build_state(config: &Config) -> anyhow::Result<(Arc<AppState>, ConnectClient)> {
    let db_path = init(&config.db_path).context("Failed to prepare database path")?;
    run_migrations(&db_path).context("Failed to run database migrations")?;
    let pool = create_pool(&db_path).context("Failed to open database pool")?;
    let cache = Arc::new(SqliteSettingsCache::new(pool));

    let client = ConnectClient::new(&connect_config(config)).context("Failed to build HTTP client")?;
    info!("Using Ledgerdeck service at {}", client.base_url());

    let coordinator = Arc::new(ConsistencyCoordinator::new(
        cache,
        Arc::new(client.clone()),
        ChangeFeed::new(config.event_channel_capacity),
    ));

    Ok((Arc::new(AppState { coordinator }), client))
}

/// Feeds polled sync job events into the tracker until the poller gives up.
pub fn spawn_sync_event_poller(
    state: &Arc<AppState>,
    client: ConnectClient,
    config: &Config,
) -> Option<JoinHandle<()>> {
    if config.access_token.is_none() {
        info!("LD_ACCESS_TOKEN not set; sync job polling disabled");
        return None;
    }

    let poller = SyncEventPoller::new(Arc::new(client), config.sync_poll_interval);
    let coordinator = Arc::clone(&state.coordinator);
    info!(
        "Polling sync job events every {}s",
        config.sync_poll_interval.as_secs()
    );
    Some(tokio::spawn(async move {
        coordinator.consume_events(poller.into_stream()).await;
    }))
}
