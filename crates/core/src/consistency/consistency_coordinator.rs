use std::sync::Arc;

use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use tokio::sync::broadcast;

use crate::errors::{Error, Result};
use crate::events::{ChangeFeed, StateEvent};
use crate::settings::{
    OptimisticMutationCoordinator, RefreshResolution, SettingKey, SettingValue,
    SettingsCacheTrait, SettingsLedger, SettingsRecord, SettingsRemoteTrait,
};
use crate::sync_jobs::{EventDisposition, SyncEvent, SyncJob, SyncJobTracker};

/// Counters for one drained event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStreamSummary {
    pub applied: usize,
    pub unchanged: usize,
    pub stale: usize,
}

/// Entry point for the UI: settings snapshots and changes, sync job snapshots, and
/// change notifications, reconciled against the cache, the remote, and the event
/// channel.
pub struct ConsistencyCoordinator {
    ledger: Arc<SettingsLedger>,
    mutations: OptimisticMutationCoordinator,
    tracker: Arc<SyncJobTracker>,
    remote: Arc<dyn SettingsRemoteTrait>,
    feed: ChangeFeed,
}

impl ConsistencyCoordinator {
    pub fn new(
        cache: Arc<dyn SettingsCacheTrait>,
        remote: Arc<dyn SettingsRemoteTrait>,
        feed: ChangeFeed,
    ) -> Self {
        let ledger = Arc::new(SettingsLedger::new(cache));
        let mutations =
            OptimisticMutationCoordinator::new(ledger.clone(), remote.clone(), feed.clone());
        let tracker = Arc::new(SyncJobTracker::new(feed.clone()));
        Self {
            ledger,
            mutations,
            tracker,
            remote,
            feed,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.feed.subscribe()
    }

    pub fn sync_job_tracker(&self) -> Arc<SyncJobTracker> {
        Arc::clone(&self.tracker)
    }

    /// Returns the live record of an entity, loading it if needed.
    ///
    /// Live or cached records are returned immediately and refreshed in the
    /// background; refresh failures are published as `SettingsLoadFailed`. Without a
    /// usable cache entry the authoritative fetch is awaited.
    pub async fn load_entity(self: &Arc<Self>, entity_id: &str) -> Result<SettingsRecord> {
        let cached = match self.ledger.install_from_cache(entity_id) {
            Ok(cached) => cached,
            Err(err) => {
                warn!(
                    "Ignoring unreadable cached settings for '{}': {}",
                    entity_id, err
                );
                None
            }
        };

        if let Some(record) = cached {
            self.spawn_refresh(entity_id);
            return Ok(record);
        }

        let fields = self
            .remote
            .fetch_settings(entity_id)
            .await
            .map_err(|err| Error::LoadFailed {
                entity_id: entity_id.to_string(),
                reason: err.to_string(),
                stale: None,
            })?;
        let record = self.ledger.install_authoritative(entity_id, fields)?;
        info!(
            "Loaded settings for '{}' at revision {}",
            entity_id, record.revision
        );
        self.feed.publish(StateEvent::SettingsChanged {
            record: record.clone(),
        });
        Ok(record)
    }

    fn spawn_refresh(self: &Arc<Self>, entity_id: &str) {
        let coordinator = Arc::clone(self);
        let entity_id = entity_id.to_string();
        tokio::spawn(async move {
            match coordinator.refresh_entity(&entity_id).await {
                Ok(_) => {}
                Err(Error::LoadFailed { reason, .. }) => {
                    coordinator.feed.publish(StateEvent::SettingsLoadFailed {
                        entity_id: entity_id.clone(),
                        reason,
                    });
                }
                Err(err) => debug!("Background refresh for '{}' ended: {}", entity_id, err),
            }
        });
    }

    /// Fetches the authoritative value and reconciles it with the live record.
    ///
    /// While a change is in flight the value is deferred until it settles. On
    /// failure the current record stays visible and is carried in `LoadFailed`.
    pub async fn refresh_entity(&self, entity_id: &str) -> Result<SettingsRecord> {
        let ticket = self.ledger.begin_refresh(entity_id)?;
        let fields = match self.remote.fetch_settings(entity_id).await {
            Ok(fields) => fields,
            Err(err) => {
                let stale = self.ledger.snapshot(entity_id).ok().map(Box::new);
                warn!("Refreshing settings for '{}' failed: {}", entity_id, err);
                return Err(Error::LoadFailed {
                    entity_id: entity_id.to_string(),
                    reason: err.to_string(),
                    stale,
                });
            }
        };

        match self.ledger.resolve_refresh(&ticket, fields)? {
            RefreshResolution::Applied(record) => {
                debug!(
                    "Refreshed settings for '{}' to revision {}",
                    entity_id, record.revision
                );
                self.feed.publish(StateEvent::SettingsChanged {
                    record: record.clone(),
                });
                Ok(record)
            }
            RefreshResolution::Deferred(record) | RefreshResolution::Discarded(record) => {
                Ok(record)
            }
        }
    }

    pub fn get_settings_snapshot(&self, entity_id: &str) -> Result<SettingsRecord> {
        self.ledger.snapshot(entity_id)
    }

    pub fn is_loaded(&self, entity_id: &str) -> bool {
        self.ledger.is_loaded(entity_id)
    }

    pub fn loaded_entities(&self) -> Vec<String> {
        self.ledger.entity_ids()
    }

    pub fn has_pending_change(&self, entity_id: &str) -> bool {
        self.ledger.pending_mutation(entity_id).is_some()
    }

    pub async fn propose_setting_change(
        &self,
        entity_id: &str,
        key: SettingKey,
        value: SettingValue,
    ) -> Result<SettingsRecord> {
        self.mutations.propose(entity_id, key, value).await
    }

    /// Destroys the record of a deleted entity, including its cache row.
    pub fn remove_entity(&self, entity_id: &str) -> Result<bool> {
        let removed = self.ledger.remove(entity_id)?;
        if removed {
            info!("Removed settings for '{}'", entity_id);
            self.feed.publish(StateEvent::SettingsRemoved {
                entity_id: entity_id.to_string(),
            });
        }
        Ok(removed)
    }

    pub fn apply_event(&self, event: &SyncEvent) -> EventDisposition {
        self.tracker.apply_event(event)
    }

    pub fn get_sync_job_snapshot(&self, job_key: &str) -> SyncJob {
        self.tracker.snapshot(job_key)
    }

    pub fn sync_job_snapshots(&self) -> Vec<SyncJob> {
        self.tracker.snapshots()
    }

    pub fn reset_sync_job(&self, job_key: &str) -> Option<SyncJob> {
        self.tracker.reset(job_key)
    }

    /// Applies every event of `events` in receipt order until the stream ends.
    pub async fn consume_events<S>(&self, events: S) -> EventStreamSummary
    where
        S: Stream<Item = SyncEvent>,
    {
        let mut summary = EventStreamSummary::default();
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            match self.apply_event(&event) {
                EventDisposition::Applied(_) => summary.applied += 1,
                EventDisposition::Unchanged => summary.unchanged += 1,
                EventDisposition::Stale(_) => summary.stale += 1,
            }
        }
        info!(
            "Sync event stream ended: {} applied, {} unchanged, {} stale",
            summary.applied, summary.unchanged, summary.stale
        );
        summary
    }
}
