//! In-memory settings state per entity, kept in lockstep with the persistent cache.
//!
//! Every method runs synchronously under one lock and writes the full record to the
//! cache before returning, so cache writes of an entity are totally ordered and the
//! in-memory record never holds a value the cache has not been asked to store. A
//! write that fails leaves the slot marked unpersisted; the next operation on the
//! entity rewrites the full record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::{debug, error, warn};
use uuid::Uuid;

use super::settings_model::{
    GroupSettings, PendingMutation, RecordSource, SettingKey, SettingValue, SettingsRecord,
};
use super::settings_traits::SettingsCacheTrait;
use crate::errors::{Error, Result};

#[derive(Debug)]
struct DeferredRefresh {
    ticket: u64,
    fields: GroupSettings,
}

#[derive(Debug)]
struct EntitySlot {
    record: SettingsRecord,
    pending: Option<PendingMutation>,
    deferred_refresh: Option<DeferredRefresh>,
    refreshes_issued: u64,
    refresh_applied: u64,
    confirmed_mutations: u64,
    unpersisted: bool,
}

impl EntitySlot {
    fn new(record: SettingsRecord) -> Self {
        Self {
            record,
            pending: None,
            deferred_refresh: None,
            refreshes_issued: 0,
            refresh_applied: 0,
            confirmed_mutations: 0,
            unpersisted: false,
        }
    }

    fn apply_authoritative(&mut self, fields: GroupSettings) {
        self.record.fields = fields;
        self.record.source = RecordSource::Authoritative;
        self.record.revision += 1;
        self.record.updated_at = Utc::now();
    }
}

/// Handle for one authoritative fetch, issued before the fetch starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    pub entity_id: String,
    ticket: u64,
    confirmed_mutations: u64,
}

/// What happened to a resolved authoritative fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshResolution {
    /// The fetched value replaced the record.
    Applied(SettingsRecord),
    /// A mutation is in flight; the value is held until it settles.
    Deferred(SettingsRecord),
    /// The fetch was older than state already held.
    Discarded(SettingsRecord),
}

impl RefreshResolution {
    pub fn record(&self) -> &SettingsRecord {
        match self {
            Self::Applied(record) | Self::Deferred(record) | Self::Discarded(record) => record,
        }
    }
}

/// Result of a confirmed mutation.
#[derive(Debug)]
pub struct Confirmation {
    pub record: SettingsRecord,
    /// Set when the confirmed record could not be written to the cache.
    pub cache_error: Option<Error>,
}

/// Result of a rolled-back mutation.
#[derive(Debug)]
pub struct Rollback {
    /// The record as restored from the pre-mutation snapshot.
    pub restored: SettingsRecord,
    /// Set when a refresh deferred during the mutation was applied after the rollback.
    pub refreshed: Option<SettingsRecord>,
    /// Set when the restored record could not be written to the cache.
    pub cache_error: Option<Error>,
}

pub struct SettingsLedger {
    cache: Arc<dyn SettingsCacheTrait>,
    slots: Mutex<HashMap<String, EntitySlot>>,
}

impl SettingsLedger {
    pub fn new(cache: Arc<dyn SettingsCacheTrait>) -> Self {
        Self {
            cache,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, EntitySlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, slot: &mut EntitySlot) -> Result<()> {
        let record = &slot.record;
        match self.cache.write_cached_entity(&record.entity_id, record) {
            Ok(()) => {
                slot.unpersisted = false;
                Ok(())
            }
            Err(err) => {
                error!(
                    "Failed to persist settings for '{}' at revision {}: {}",
                    record.entity_id, record.revision, err
                );
                slot.unpersisted = true;
                Err(err)
            }
        }
    }

    /// Writes a settled record. When that fails the row may still hold an
    /// unconfirmed value, so it is deleted; a missing row reloads from the remote.
    fn persist_settled(&self, slot: &mut EntitySlot) -> Option<Error> {
        let err = self.persist(slot).err()?;
        let entity_id = &slot.record.entity_id;
        match self.cache.delete_cached_entity(entity_id) {
            Ok(()) => warn!(
                "Dropped cached settings for '{}' until they can be rewritten",
                entity_id
            ),
            Err(delete_err) => error!(
                "Failed to drop stale cached settings for '{}': {}",
                entity_id, delete_err
            ),
        }
        Some(err)
    }

    fn repair(&self, slot: &mut EntitySlot) {
        if slot.unpersisted && self.persist(slot).is_ok() {
            debug!(
                "Rewrote cached settings for '{}' at revision {}",
                slot.record.entity_id, slot.record.revision
            );
        }
    }

    pub fn snapshot(&self, entity_id: &str) -> Result<SettingsRecord> {
        self.slots()
            .get(entity_id)
            .map(|slot| slot.record.clone())
            .ok_or_else(|| Error::NotLoaded(entity_id.to_string()))
    }

    pub fn is_loaded(&self, entity_id: &str) -> bool {
        self.slots().contains_key(entity_id)
    }

    pub fn pending_mutation(&self, entity_id: &str) -> Option<PendingMutation> {
        self.slots()
            .get(entity_id)
            .and_then(|slot| slot.pending.clone())
    }

    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids = self.slots().keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    /// Makes the cached record live, marked `Cached`. Returns the live record if the
    /// entity is already loaded and `None` on a cache miss.
    pub fn install_from_cache(&self, entity_id: &str) -> Result<Option<SettingsRecord>> {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(entity_id) {
            self.repair(slot);
            return Ok(Some(slot.record.clone()));
        }
        let Some(mut record) = self.cache.read_cached_entity(entity_id)? else {
            return Ok(None);
        };
        // An optimistic row was never settled, so the remote may have refused it.
        if record.source == RecordSource::Optimistic {
            warn!(
                "Ignoring unconfirmed cached settings for '{}' at revision {}",
                entity_id, record.revision
            );
            return Ok(None);
        }
        record.entity_id = entity_id.to_string();
        record.source = RecordSource::Cached;
        debug!(
            "Loaded cached settings for '{}' at revision {}",
            entity_id, record.revision
        );
        slots.insert(entity_id.to_string(), EntitySlot::new(record.clone()));
        Ok(Some(record))
    }

    /// Creates the record from a first authoritative fetch. If another load won the
    /// race, the live record is kept and returned.
    pub fn install_authoritative(
        &self,
        entity_id: &str,
        fields: GroupSettings,
    ) -> Result<SettingsRecord> {
        let mut slots = self.slots();
        if let Some(slot) = slots.get(entity_id) {
            return Ok(slot.record.clone());
        }
        let record = SettingsRecord::new(entity_id, fields, 1, RecordSource::Authoritative);
        let mut slot = EntitySlot::new(record.clone());
        self.persist_settled(&mut slot);
        slots.insert(entity_id.to_string(), slot);
        Ok(record)
    }

    pub fn begin_refresh(&self, entity_id: &str) -> Result<RefreshTicket> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(entity_id)
            .ok_or_else(|| Error::NotLoaded(entity_id.to_string()))?;
        self.repair(slot);
        slot.refreshes_issued += 1;
        Ok(RefreshTicket {
            entity_id: entity_id.to_string(),
            ticket: slot.refreshes_issued,
            confirmed_mutations: slot.confirmed_mutations,
        })
    }

    pub fn resolve_refresh(
        &self,
        ticket: &RefreshTicket,
        fields: GroupSettings,
    ) -> Result<RefreshResolution> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(&ticket.entity_id)
            .ok_or_else(|| Error::NotLoaded(ticket.entity_id.clone()))?;

        if ticket.ticket <= slot.refresh_applied {
            debug!(
                "Discarding refresh #{} for '{}': #{} already applied",
                ticket.ticket, ticket.entity_id, slot.refresh_applied
            );
            return Ok(RefreshResolution::Discarded(slot.record.clone()));
        }

        if slot.pending.is_some() {
            let newer = slot
                .deferred_refresh
                .as_ref()
                .map_or(true, |deferred| deferred.ticket < ticket.ticket);
            if newer {
                slot.deferred_refresh = Some(DeferredRefresh {
                    ticket: ticket.ticket,
                    fields,
                });
            }
            debug!(
                "Deferring refresh #{} for '{}' until the in-flight change settles",
                ticket.ticket, ticket.entity_id
            );
            return Ok(RefreshResolution::Deferred(slot.record.clone()));
        }

        if ticket.confirmed_mutations != slot.confirmed_mutations {
            debug!(
                "Discarding refresh #{} for '{}': issued before a confirmed change",
                ticket.ticket, ticket.entity_id
            );
            return Ok(RefreshResolution::Discarded(slot.record.clone()));
        }

        slot.apply_authoritative(fields);
        slot.refresh_applied = ticket.ticket;
        self.persist_settled(slot);
        Ok(RefreshResolution::Applied(slot.record.clone()))
    }

    /// Applies a proposed value optimistically and persists it.
    ///
    /// Fails with `Busy` while another change is in flight, leaving that change's
    /// snapshot untouched. If the cache write fails the in-memory record is restored.
    pub fn begin_mutation(
        &self,
        entity_id: &str,
        key: SettingKey,
        value: SettingValue,
    ) -> Result<(PendingMutation, SettingsRecord)> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(entity_id)
            .ok_or_else(|| Error::NotLoaded(entity_id.to_string()))?;
        if slot.pending.is_some() {
            return Err(Error::Busy {
                entity_id: entity_id.to_string(),
            });
        }

        let mut fields = slot.record.fields.clone();
        fields.set(key, value)?;

        let pending = PendingMutation {
            mutation_id: Uuid::new_v4().to_string(),
            entity_id: entity_id.to_string(),
            key,
            proposed_value: value,
            previous_snapshot: slot.record.fields.clone(),
            previous_source: slot.record.source,
            started_at: Utc::now(),
        };

        let mut optimistic = slot.record.clone();
        optimistic.fields = fields;
        optimistic.source = RecordSource::Optimistic;
        optimistic.updated_at = pending.started_at;
        self.cache.write_cached_entity(entity_id, &optimistic)?;

        slot.record = optimistic.clone();
        slot.pending = Some(pending.clone());
        slot.unpersisted = false;
        Ok((pending, optimistic))
    }

    fn settling_slot<'a>(
        slots: &'a mut HashMap<String, EntitySlot>,
        entity_id: &str,
        mutation_id: &str,
    ) -> Result<&'a mut EntitySlot> {
        match slots.get_mut(entity_id) {
            Some(slot)
                if slot
                    .pending
                    .as_ref()
                    .is_some_and(|pending| pending.mutation_id == mutation_id) =>
            {
                Ok(slot)
            }
            _ => {
                warn!(
                    "Change {} for '{}' settled after the entity was removed",
                    mutation_id, entity_id
                );
                Err(Error::NotLoaded(entity_id.to_string()))
            }
        }
    }

    /// Marks the in-flight change as accepted. `canonical` replaces the fields when
    /// the remote returned them; otherwise the optimistic fields are kept.
    pub fn confirm_mutation(
        &self,
        entity_id: &str,
        mutation_id: &str,
        canonical: Option<GroupSettings>,
    ) -> Result<Confirmation> {
        let mut slots = self.slots();
        let slot = Self::settling_slot(&mut slots, entity_id, mutation_id)?;
        let fields = canonical.unwrap_or_else(|| slot.record.fields.clone());
        slot.apply_authoritative(fields);
        slot.pending = None;
        slot.confirmed_mutations += 1;
        if let Some(deferred) = slot.deferred_refresh.take() {
            debug!(
                "Dropping refresh #{} for '{}': superseded by confirmed change",
                deferred.ticket, entity_id
            );
        }
        let cache_error = self.persist_settled(slot);
        Ok(Confirmation {
            record: slot.record.clone(),
            cache_error,
        })
    }

    /// Restores the pre-mutation snapshot, then applies any refresh deferred while
    /// the change was in flight.
    pub fn roll_back_mutation(&self, entity_id: &str, mutation_id: &str) -> Result<Rollback> {
        let mut slots = self.slots();
        let slot = Self::settling_slot(&mut slots, entity_id, mutation_id)?;
        let Some(pending) = slot.pending.take() else {
            return Err(Error::NotLoaded(entity_id.to_string()));
        };

        slot.record.fields = pending.previous_snapshot;
        slot.record.source = match pending.previous_source {
            RecordSource::Authoritative => RecordSource::Authoritative,
            _ => RecordSource::Cached,
        };
        slot.record.updated_at = Utc::now();
        let restored = slot.record.clone();
        let mut cache_error = self.persist_settled(slot);

        let refreshed = match slot.deferred_refresh.take() {
            Some(deferred) if deferred.ticket > slot.refresh_applied => {
                slot.apply_authoritative(deferred.fields);
                slot.refresh_applied = deferred.ticket;
                if let Some(err) = self.persist_settled(slot) {
                    cache_error.get_or_insert(err);
                }
                Some(slot.record.clone())
            }
            _ => None,
        };

        Ok(Rollback {
            restored,
            refreshed,
            cache_error,
        })
    }

    /// Destroys the live record and its cache row.
    pub fn remove(&self, entity_id: &str) -> Result<bool> {
        let mut slots = self.slots();
        self.cache.delete_cached_entity(entity_id)?;
        Ok(slots.remove(entity_id).is_some())
    }
}
