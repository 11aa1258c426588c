mod api;
mod config;
mod error;
mod main_lib;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::main_lib::{build_state, init_tracing, spawn_sync_event_poller};

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    let (state, client) = build_state(&config)?;
    let poller = spawn_sync_event_poller(&state, client, &config);

    let app = api::app_router(state);
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("Ledgerdeck server listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(poller) = poller {
        poller.abort();
    }
    Ok(())
}
