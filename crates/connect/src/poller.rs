//! Polling source for sync job events.
//!
//! The service exposes job status as a pull endpoint. `SyncEventPoller` turns it into
//! a `Stream` of events in emission order: it polls at a fixed interval, backs off
//! exponentially with jitter while failures are retryable, and ends the stream once a
//! failure is permanent or needs re-authentication.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use log::{debug, error, warn};
use rand::Rng;

use ledgerdeck_core::sync_jobs::SyncEvent;

use crate::client::ConnectClient;
use crate::error::{ApiRetryClass, Result};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Anything that can be asked for the next batch of sync events.
#[async_trait]
pub trait SyncEventSource: Send + Sync {
    async fn fetch_sync_events(&self) -> Result<Vec<SyncEvent>>;
}

#[async_trait]
impl SyncEventSource for ConnectClient {
    async fn fetch_sync_events(&self) -> Result<Vec<SyncEvent>> {
        ConnectClient::fetch_sync_events(self).await
    }
}

/// Delay before the next attempt after `consecutive_failures` prior failures.
pub fn backoff_seconds(consecutive_failures: u32) -> u64 {
    const MAX_EXPONENT: u32 = 8;
    const BASE_DELAY_SECONDS: u64 = 5;

    2_u64.pow(consecutive_failures.min(MAX_EXPONENT)) * BASE_DELAY_SECONDS
}

fn backoff_with_jitter(consecutive_failures: u32) -> Duration {
    let backoff_ms = backoff_seconds(consecutive_failures).saturating_mul(1_000);
    let jitter = rand::thread_rng().gen_range(0..=(backoff_ms / 5).max(1));
    Duration::from_millis(backoff_ms.saturating_add(jitter))
}

pub struct SyncEventPoller {
    source: Arc<dyn SyncEventSource>,
    interval: Duration,
}

struct PollState {
    source: Arc<dyn SyncEventSource>,
    interval: Duration,
    pending: VecDeque<SyncEvent>,
    failures: u32,
    polled: bool,
}

impl PollState {
    fn next_delay(&self) -> Duration {
        if self.failures == 0 {
            self.interval
        } else {
            backoff_with_jitter(self.failures - 1)
        }
    }
}

impl SyncEventPoller {
    pub fn new(source: Arc<dyn SyncEventSource>, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// The first poll happens immediately; later ones wait for the interval or the
    /// current backoff.
    pub fn into_stream(self) -> impl Stream<Item = SyncEvent> + Send + 'static {
        let state = PollState {
            source: self.source,
            interval: self.interval,
            pending: VecDeque::new(),
            failures: 0,
            polled: false,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((event, state));
                }
                if state.polled {
                    tokio::time::sleep(state.next_delay()).await;
                }
                state.polled = true;

                match state.source.fetch_sync_events().await {
                    Ok(events) => {
                        if state.failures > 0 {
                            debug!("Sync event poll recovered after {} failure(s)", state.failures);
                        }
                        state.failures = 0;
                        state.pending.extend(events);
                    }
                    Err(err) => match err.retry_class() {
                        ApiRetryClass::Retryable => {
                            state.failures = state.failures.saturating_add(1);
                            warn!(
                                "Sync event poll failed (attempt {}), backing off: {}",
                                state.failures, err
                            );
                        }
                        ApiRetryClass::Permanent | ApiRetryClass::ReauthRequired => {
                            error!("Sync event polling stopped: {}", err);
                            return None;
                        }
                    },
                }
            }
        })
    }
}
