use std::sync::Arc;

use log::{debug, error, info, warn};

use super::settings_ledger::SettingsLedger;
use super::settings_model::{PendingMutation, SettingKey, SettingValue, SettingsRecord};
use super::settings_traits::SettingsRemoteTrait;
use crate::errors::{Error, Result};
use crate::events::{ChangeFeed, StateEvent};

/// Applies settings changes optimistically and reconciles them with the remote.
///
/// At most one change per entity is in flight; a second request fails with `Busy`.
/// Failed writes are rolled back and returned as `MutationFailed`, never retried.
/// Once started, a change settles on its own task, so dropping the caller's future
/// never leaves the entity stuck in `Optimistic`.
pub struct OptimisticMutationCoordinator {
    ledger: Arc<SettingsLedger>,
    remote: Arc<dyn SettingsRemoteTrait>,
    feed: ChangeFeed,
}

impl OptimisticMutationCoordinator {
    pub fn new(
        ledger: Arc<SettingsLedger>,
        remote: Arc<dyn SettingsRemoteTrait>,
        feed: ChangeFeed,
    ) -> Self {
        Self {
            ledger,
            remote,
            feed,
        }
    }

    pub async fn propose(
        &self,
        entity_id: &str,
        key: SettingKey,
        value: SettingValue,
    ) -> Result<SettingsRecord> {
        key.validate(&value)?;

        let (pending, optimistic) = self.ledger.begin_mutation(entity_id, key, value)?;
        debug!(
            "Change {} for '{}': {} -> {:?}",
            pending.mutation_id, entity_id, key, value
        );
        self.feed.publish(StateEvent::SettingsChanged { record: optimistic });

        let task = tokio::spawn(settle(
            Arc::clone(&self.ledger),
            Arc::clone(&self.remote),
            self.feed.clone(),
            pending.clone(),
        ));
        match task.await {
            Ok(result) => result,
            Err(err) => {
                error!(
                    "Change {} for '{}' did not settle: {}",
                    pending.mutation_id, entity_id, err
                );
                Err(roll_back(&self.ledger, &self.feed, &pending, err.to_string()))
            }
        }
    }
}

async fn settle(
    ledger: Arc<SettingsLedger>,
    remote: Arc<dyn SettingsRemoteTrait>,
    feed: ChangeFeed,
    pending: PendingMutation,
) -> Result<SettingsRecord> {
    let entity_id = pending.entity_id.as_str();
    match remote
        .write_settings(entity_id, pending.key, pending.proposed_value)
        .await
    {
        Ok(canonical) => {
            let silent = canonical.is_none();
            let confirmation =
                ledger.confirm_mutation(entity_id, &pending.mutation_id, canonical)?;
            let record = confirmation.record;
            info!(
                "Change {} for '{}' confirmed at revision {}{}",
                pending.mutation_id,
                entity_id,
                record.revision,
                if silent { " (no payload)" } else { "" }
            );
            feed.publish(StateEvent::SettingsChanged {
                record: record.clone(),
            });
            match confirmation.cache_error {
                Some(err) => Err(err),
                None => Ok(record),
            }
        }
        Err(err) => {
            let reason = err.to_string();
            warn!(
                "Change {} for '{}' failed, rolling back: {}",
                pending.mutation_id, entity_id, reason
            );
            Err(roll_back(&ledger, &feed, &pending, reason))
        }
    }
}

/// Restores the pre-mutation record and publishes the snap-back. Returns the error
/// to hand back to the caller.
fn roll_back(
    ledger: &SettingsLedger,
    feed: &ChangeFeed,
    pending: &PendingMutation,
    reason: String,
) -> Error {
    let entity_id = pending.entity_id.as_str();
    let rollback = match ledger.roll_back_mutation(entity_id, &pending.mutation_id) {
        Ok(rollback) => rollback,
        Err(err) => return err,
    };
    if let Some(err) = &rollback.cache_error {
        warn!(
            "Rolled back change {} for '{}' is not yet persisted: {}",
            pending.mutation_id, entity_id, err
        );
    }
    feed.publish(StateEvent::SettingsChanged {
        record: rollback.restored.clone(),
    });
    feed.publish(StateEvent::MutationRolledBack {
        entity_id: entity_id.to_string(),
        key: pending.key,
        reason: reason.clone(),
    });
    if let Some(refreshed) = rollback.refreshed {
        feed.publish(StateEvent::SettingsChanged { record: refreshed });
    }
    Error::MutationFailed {
        entity_id: entity_id.to_string(),
        key: pending.key,
        reason,
        restored: Box::new(rollback.restored),
    }
}
