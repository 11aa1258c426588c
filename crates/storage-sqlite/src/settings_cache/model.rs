use diesel::prelude::*;

/// Row of `settings_cache`. `fields` holds the settings as JSON.
#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(primary_key(entity_id))]
#[diesel(table_name = crate::schema::settings_cache)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SettingsCacheDB {
    pub entity_id: String,
    pub fields: String,
    pub revision: i64,
    pub source: String,
    pub updated_at: String,
}
