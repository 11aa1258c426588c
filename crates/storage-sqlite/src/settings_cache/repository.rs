use std::sync::Arc;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::debug;

use ledgerdeck_core::errors::{CacheError, Result};
use ledgerdeck_core::settings::{GroupSettings, SettingsCacheTrait, SettingsRecord};

use super::model::SettingsCacheDB;
use crate::db::{get_connection, DbPool};
use crate::errors::StorageError;
use crate::schema::settings_cache;

fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

fn invalid(entity_id: &str, reason: impl ToString) -> CacheError {
    CacheError::InvalidRecord {
        entity_id: entity_id.to_string(),
        reason: reason.to_string(),
    }
}

fn record_to_db(entity_id: &str, record: &SettingsRecord) -> Result<SettingsCacheDB> {
    Ok(SettingsCacheDB {
        entity_id: entity_id.to_string(),
        fields: serde_json::to_string(&record.fields)?,
        revision: record.revision,
        source: enum_to_db(&record.source)?,
        updated_at: record.updated_at.to_rfc3339(),
    })
}

/// Decodes a row, rejecting anything outside the settings schema.
fn record_from_db(row: SettingsCacheDB) -> Result<SettingsRecord> {
    let fields = GroupSettings::from_json(&row.fields).map_err(|err| invalid(&row.entity_id, err))?;
    let source = enum_from_db(&row.source).map_err(|err| invalid(&row.entity_id, err))?;
    let updated_at = DateTime::parse_from_rfc3339(&row.updated_at)
        .map_err(|err| invalid(&row.entity_id, err))?
        .with_timezone(&Utc);
    Ok(SettingsRecord {
        entity_id: row.entity_id,
        fields,
        revision: row.revision,
        source,
        updated_at,
    })
}

/// Settings cache backed by the `settings_cache` table, one row per entity.
pub struct SqliteSettingsCache {
    pool: Arc<DbPool>,
}

impl SqliteSettingsCache {
    pub fn new(pool: Arc<DbPool>) -> Self {
        SqliteSettingsCache { pool }
    }

    pub fn cached_entity_ids(&self) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        let ids = settings_cache::table
            .select(settings_cache::entity_id)
            .order(settings_cache::entity_id.asc())
            .load::<String>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(ids)
    }
}

impl SettingsCacheTrait for SqliteSettingsCache {
    fn read_cached_entity(&self, entity_id: &str) -> Result<Option<SettingsRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = settings_cache::table
            .find(entity_id)
            .select(SettingsCacheDB::as_select())
            .first::<SettingsCacheDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(record_from_db).transpose()
    }

    fn write_cached_entity(&self, entity_id: &str, record: &SettingsRecord) -> Result<()> {
        let row = record_to_db(entity_id, record)?;
        let mut conn = get_connection(&self.pool)?;
        diesel::replace_into(settings_cache::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(StorageError::from)?;
        debug!(
            "Cached settings for '{}' at revision {} ({})",
            entity_id, row.revision, row.source
        );
        Ok(())
    }

    fn delete_cached_entity(&self, entity_id: &str) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;
        diesel::delete(settings_cache::table.find(entity_id))
            .execute(&mut conn)
            .map_err(StorageError::from)?;
        Ok(())
    }
}
