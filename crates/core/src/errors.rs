//! Error types shared by the client-state core and its collaborators.

use thiserror::Error;

use crate::settings::{SettingKey, SettingsRecord};

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the settings and sync-status core.
#[derive(Debug, Error)]
pub enum Error {
    /// The entity has no live settings record; call `load_entity` first.
    #[error("Settings for '{0}' have not been loaded")]
    NotLoaded(String),

    /// A settings change for the same entity is still in flight.
    #[error("A settings change for '{entity_id}' is already in flight")]
    Busy { entity_id: String },

    /// The authoritative write failed. Local state was rolled back to `restored`
    /// before this error was returned.
    #[error("Changing '{key}' for '{entity_id}' failed: {reason}")]
    MutationFailed {
        entity_id: String,
        key: SettingKey,
        reason: String,
        restored: Box<SettingsRecord>,
    },

    /// The authoritative fetch failed. `stale` holds the record that stays visible,
    /// if one was cached.
    #[error("Loading settings for '{entity_id}' failed: {reason}")]
    LoadFailed {
        entity_id: String,
        reason: String,
        stale: Option<Box<SettingsRecord>>,
    },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of the local persistent cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Storage failure: {0}")]
    Storage(String),

    /// A cached row could not be decoded into the settings schema.
    #[error("Cached record for '{entity_id}' is invalid: {reason}")]
    InvalidRecord { entity_id: String, reason: String },
}

/// Failures of the authoritative remote source.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Short machine-readable code, used by the web bridge and in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotLoaded(_) => "not_loaded",
            Self::Busy { .. } => "busy",
            Self::MutationFailed { .. } => "mutation_failed",
            Self::LoadFailed { .. } => "load_failed",
            Self::InvalidSetting(_) => "invalid_setting",
            Self::Cache(_) => "cache_error",
            Self::Remote(_) => "remote_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// True when the caller may simply retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Busy { .. } | Self::MutationFailed { .. } | Self::LoadFailed { .. }
        )
    }
}
