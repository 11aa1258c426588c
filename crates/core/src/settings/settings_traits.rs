use async_trait::async_trait;

use super::settings_model::{GroupSettings, SettingKey, SettingValue, SettingsRecord};
use crate::errors::Result;

/// Durable per-entity storage for settings records. Pure get/set/delete.
///
/// Calls are synchronous: the coordinators persist while holding the entity state
/// lock, which orders every write of one entity.
pub trait SettingsCacheTrait: Send + Sync {
    fn read_cached_entity(&self, entity_id: &str) -> Result<Option<SettingsRecord>>;
    fn write_cached_entity(&self, entity_id: &str, record: &SettingsRecord) -> Result<()>;
    fn delete_cached_entity(&self, entity_id: &str) -> Result<()>;
}

/// The authoritative settings source.
#[async_trait]
pub trait SettingsRemoteTrait: Send + Sync {
    async fn fetch_settings(&self, entity_id: &str) -> Result<GroupSettings>;

    /// Writes one setting. `Ok(None)` means the remote accepted the write without
    /// returning the canonical settings.
    async fn write_settings(
        &self,
        entity_id: &str,
        key: SettingKey,
        value: SettingValue,
    ) -> Result<Option<GroupSettings>>;
}
