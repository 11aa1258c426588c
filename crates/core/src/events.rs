//! Change notifications for UI subscribers.
//!
//! Subscribers receive owned snapshots; nothing handed out here aliases live state.

use log::trace;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::settings::{SettingKey, SettingsRecord};
use crate::sync_jobs::SyncJob;

/// Default number of buffered events per subscriber before the slowest one lags.
pub const DEFAULT_CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StateEvent {
    SettingsChanged {
        record: SettingsRecord,
    },
    SettingsRemoved {
        entity_id: String,
    },
    /// A refresh failed; the visible record may be stale.
    SettingsLoadFailed {
        entity_id: String,
        reason: String,
    },
    /// A change was rejected and its value snapped back. Drives the error toast.
    MutationRolledBack {
        entity_id: String,
        key: SettingKey,
        reason: String,
    },
    SyncJobChanged {
        job: SyncJob,
    },
}

impl StateEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SettingsChanged { .. } => "settings_changed",
            Self::SettingsRemoved { .. } => "settings_removed",
            Self::SettingsLoadFailed { .. } => "settings_load_failed",
            Self::MutationRolledBack { .. } => "mutation_rolled_back",
            Self::SyncJobChanged { .. } => "sync_job_changed",
        }
    }
}

/// Broadcast fan-out of [`StateEvent`]s.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<StateEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: StateEvent) {
        let name = event.name();
        // No subscribers is not an error: snapshots stay readable.
        if self.sender.send(event).is_err() {
            trace!("No subscribers for {}", name);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_FEED_CAPACITY)
    }
}
