//! SQLite persistence for Ledgerdeck, built on Diesel.

pub mod db;
pub mod errors;
pub mod schema;
pub mod settings_cache;

pub use db::{create_pool, get_connection, init, run_migrations, DbConnection, DbPool};
pub use errors::StorageError;
pub use settings_cache::SqliteSettingsCache;
