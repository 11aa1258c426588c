mod model;
mod repository;

pub use model::SettingsCacheDB;
pub use repository::SqliteSettingsCache;
