//! Fakes for the collaborator traits shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::errors::{CacheError, RemoteError, Result};
use crate::settings::{
    GroupSettings, InMemorySettingsCache, RecordSource, SettingKey, SettingValue,
    SettingsCacheTrait, SettingsRecord, SettingsRemoteTrait,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Apply the write and return the stored settings.
    Canonical,
    /// Apply the write and return nothing.
    Silent,
    /// Reject the write.
    Fail,
}

/// A remote holding settings per entity, with switchable failure modes and
/// gates that hold a call in flight until the test releases it.
pub struct FakeRemote {
    pub stored: Mutex<HashMap<String, GroupSettings>>,
    write_mode: Mutex<WriteMode>,
    fetch_fails: AtomicBool,
    pub writes: AtomicUsize,
    pub fetches: AtomicUsize,
    write_gate: Option<Gate>,
    next_fetch_gate: Mutex<Option<Gate>>,
}

#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            stored: Mutex::new(HashMap::new()),
            write_mode: Mutex::new(WriteMode::Canonical),
            fetch_fails: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            write_gate: None,
            next_fetch_gate: Mutex::new(None),
        }
    }

    pub fn with_settings(self, entity_id: &str, settings: GroupSettings) -> Self {
        self.stored
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), settings);
        self
    }

    pub fn with_write_gate(mut self, gate: Gate) -> Self {
        self.write_gate = Some(gate);
        self
    }

    /// Holds only the next fetch at the gate.
    pub fn gate_next_fetch(&self, gate: Gate) {
        *self.next_fetch_gate.lock().unwrap() = Some(gate);
    }

    pub fn set_write_mode(&self, mode: WriteMode) {
        *self.write_mode.lock().unwrap() = mode;
    }

    pub fn set_fetch_fails(&self, fails: bool) {
        self.fetch_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_stored(&self, entity_id: &str, settings: GroupSettings) {
        self.stored
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), settings);
    }
}

#[async_trait]
impl SettingsRemoteTrait for FakeRemote {
    async fn fetch_settings(&self, entity_id: &str) -> Result<GroupSettings> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        // Capture the value before waiting so a gated fetch returns what the server
        // held when the request was issued.
        let snapshot = self.stored.lock().unwrap().get(entity_id).cloned();
        let gate = self.next_fetch_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if self.fetch_fails.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection refused".to_string()).into());
        }
        snapshot.ok_or_else(|| {
            RemoteError::Rejected {
                status: 404,
                message: format!("group '{}' not found", entity_id),
            }
            .into()
        })
    }

    async fn write_settings(
        &self,
        entity_id: &str,
        key: SettingKey,
        value: SettingValue,
    ) -> Result<Option<GroupSettings>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.write_gate {
            gate.pass().await;
        }
        let mode = *self.write_mode.lock().unwrap();
        if mode == WriteMode::Fail {
            return Err(RemoteError::Rejected {
                status: 503,
                message: "service unavailable".to_string(),
            }
            .into());
        }
        let mut stored = self.stored.lock().unwrap();
        let settings = stored.entry(entity_id.to_string()).or_default();
        settings.set(key, value)?;
        Ok(match mode {
            WriteMode::Canonical => Some(settings.clone()),
            _ => None,
        })
    }
}

/// Cache whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakyCache {
    pub inner: InMemorySettingsCache,
    pub fail_writes: AtomicBool,
    pub writes: Mutex<Vec<SettingsRecord>>,
}

impl SettingsCacheTrait for FlakyCache {
    fn read_cached_entity(&self, entity_id: &str) -> Result<Option<SettingsRecord>> {
        self.inner.read_cached_entity(entity_id)
    }

    fn write_cached_entity(&self, entity_id: &str, record: &SettingsRecord) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Storage("disk full".to_string()).into());
        }
        self.writes.lock().unwrap().push(record.clone());
        self.inner.write_cached_entity(entity_id, record)
    }

    fn delete_cached_entity(&self, entity_id: &str) -> Result<()> {
        self.inner.delete_cached_entity(entity_id)
    }
}

pub fn group_settings(hide_empty_accounts: bool, auto_archive_inactive: bool) -> GroupSettings {
    GroupSettings {
        hide_empty_accounts,
        auto_archive_inactive,
        ..GroupSettings::default()
    }
}

pub fn authoritative_record(entity_id: &str, fields: GroupSettings, revision: i64) -> SettingsRecord {
    SettingsRecord::new(entity_id, fields, revision, RecordSource::Authoritative)
}
