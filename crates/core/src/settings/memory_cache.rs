use std::collections::HashMap;
use std::sync::RwLock;

use super::settings_model::SettingsRecord;
use super::settings_traits::SettingsCacheTrait;
use crate::errors::{CacheError, Result};

/// Process-local cache, used when no durable store is configured and in tests.
#[derive(Debug, Default)]
pub struct InMemorySettingsCache {
    records: RwLock<HashMap<String, SettingsRecord>>,
}

impl InMemorySettingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> CacheError {
    CacheError::Storage("In-memory settings cache is poisoned".to_string())
}

impl SettingsCacheTrait for InMemorySettingsCache {
    fn read_cached_entity(&self, entity_id: &str) -> Result<Option<SettingsRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(entity_id).cloned())
    }

    fn write_cached_entity(&self, entity_id: &str, record: &SettingsRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(entity_id.to_string(), record.clone());
        Ok(())
    }

    fn delete_cached_entity(&self, entity_id: &str) -> Result<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.remove(entity_id);
        Ok(())
    }
}
