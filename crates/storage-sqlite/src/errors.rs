use ledgerdeck_core::errors::{CacheError, Error};
use thiserror::Error;

/// Failures of the SQLite layer, folded into `Error::Cache` at the crate boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Database path error: {0}")]
    Path(#[from] std::io::Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Cache(CacheError::Storage(err.to_string()))
    }
}
