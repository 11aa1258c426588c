//! Group settings schema and the cached settings record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Upper bound for `inactivityThresholdDays`.
pub const MAX_INACTIVITY_THRESHOLD_DAYS: f64 = 3650.0;
/// Upper bound for `sortOrder`.
pub const MAX_SORT_ORDER: f64 = 10_000.0;

/// Known group setting keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingKey {
    HideEmptyAccounts,
    AutoArchiveInactive,
    IncludeInNetWorth,
    CollapsedByDefault,
    InactivityThresholdDays,
    SortOrder,
}

/// Value kind a key accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Number,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::HideEmptyAccounts,
        SettingKey::AutoArchiveInactive,
        SettingKey::IncludeInNetWorth,
        SettingKey::CollapsedByDefault,
        SettingKey::InactivityThresholdDays,
        SettingKey::SortOrder,
    ];

    /// Wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::HideEmptyAccounts => "hideEmptyAccounts",
            SettingKey::AutoArchiveInactive => "autoArchiveInactive",
            SettingKey::IncludeInNetWorth => "includeInNetWorth",
            SettingKey::CollapsedByDefault => "collapsedByDefault",
            SettingKey::InactivityThresholdDays => "inactivityThresholdDays",
            SettingKey::SortOrder => "sortOrder",
        }
    }

    pub fn kind(&self) -> SettingKind {
        match self {
            SettingKey::HideEmptyAccounts
            | SettingKey::AutoArchiveInactive
            | SettingKey::IncludeInNetWorth
            | SettingKey::CollapsedByDefault => SettingKind::Bool,
            SettingKey::InactivityThresholdDays | SettingKey::SortOrder => SettingKind::Number,
        }
    }

    /// Checks that `value` has the type and range this key accepts.
    pub fn validate(&self, value: &SettingValue) -> Result<()> {
        match (self.kind(), value) {
            (SettingKind::Bool, SettingValue::Bool(_)) => Ok(()),
            (SettingKind::Number, SettingValue::Number(n)) => {
                let max = match self {
                    SettingKey::InactivityThresholdDays => MAX_INACTIVITY_THRESHOLD_DAYS,
                    _ => MAX_SORT_ORDER,
                };
                if !n.is_finite() || n.fract() != 0.0 {
                    return Err(Error::InvalidSetting(format!(
                        "{} must be a whole number",
                        self
                    )));
                }
                if *n < 0.0 || *n > max {
                    return Err(Error::InvalidSetting(format!(
                        "{} must be between 0 and {}",
                        self, max
                    )));
                }
                Ok(())
            }
            (SettingKind::Bool, SettingValue::Number(_)) => Err(Error::InvalidSetting(format!(
                "{} expects a boolean",
                self
            ))),
            (SettingKind::Number, SettingValue::Bool(_)) => Err(Error::InvalidSetting(format!(
                "{} expects a number",
                self
            ))),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single setting value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(f64),
}

/// Typed settings of one group. Unknown keys are rejected on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct GroupSettings {
    pub hide_empty_accounts: bool,
    pub auto_archive_inactive: bool,
    pub include_in_net_worth: bool,
    pub collapsed_by_default: bool,
    pub inactivity_threshold_days: f64,
    pub sort_order: f64,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            hide_empty_accounts: false,
            auto_archive_inactive: false,
            include_in_net_worth: true,
            collapsed_by_default: false,
            inactivity_threshold_days: 90.0,
            sort_order: 0.0,
        }
    }
}

impl GroupSettings {
    pub fn get(&self, key: SettingKey) -> SettingValue {
        match key {
            SettingKey::HideEmptyAccounts => SettingValue::Bool(self.hide_empty_accounts),
            SettingKey::AutoArchiveInactive => SettingValue::Bool(self.auto_archive_inactive),
            SettingKey::IncludeInNetWorth => SettingValue::Bool(self.include_in_net_worth),
            SettingKey::CollapsedByDefault => SettingValue::Bool(self.collapsed_by_default),
            SettingKey::InactivityThresholdDays => {
                SettingValue::Number(self.inactivity_threshold_days)
            }
            SettingKey::SortOrder => SettingValue::Number(self.sort_order),
        }
    }

    /// Validates and assigns one value. Leaves `self` untouched on error.
    pub fn set(&mut self, key: SettingKey, value: SettingValue) -> Result<()> {
        key.validate(&value)?;
        match (key, value) {
            (SettingKey::HideEmptyAccounts, SettingValue::Bool(v)) => self.hide_empty_accounts = v,
            (SettingKey::AutoArchiveInactive, SettingValue::Bool(v)) => {
                self.auto_archive_inactive = v
            }
            (SettingKey::IncludeInNetWorth, SettingValue::Bool(v)) => self.include_in_net_worth = v,
            (SettingKey::CollapsedByDefault, SettingValue::Bool(v)) => {
                self.collapsed_by_default = v
            }
            (SettingKey::InactivityThresholdDays, SettingValue::Number(v)) => {
                self.inactivity_threshold_days = v
            }
            (SettingKey::SortOrder, SettingValue::Number(v)) => self.sort_order = v,
            // validate() already rejected every other pairing
            _ => {}
        }
        Ok(())
    }

    /// Checks every field against the schema ranges.
    pub fn validate(&self) -> Result<()> {
        for key in SettingKey::ALL {
            key.validate(&self.get(key))?;
        }
        Ok(())
    }

    /// Decodes and validates a JSON payload from the cache or the remote.
    pub fn from_json(value: &str) -> Result<Self> {
        let settings: GroupSettings = serde_json::from_str(value)?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Provenance of the value currently held for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Authoritative,
    Cached,
    Optimistic,
}

/// The single live settings record of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRecord {
    pub entity_id: String,
    pub fields: GroupSettings,
    pub revision: i64,
    pub source: RecordSource,
    pub updated_at: DateTime<Utc>,
}

impl SettingsRecord {
    pub fn new(
        entity_id: impl Into<String>,
        fields: GroupSettings,
        revision: i64,
        source: RecordSource,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            fields,
            revision,
            source,
            updated_at: Utc::now(),
        }
    }
}

/// The one in-flight change of an entity, holding what rollback restores.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub mutation_id: String,
    pub entity_id: String,
    pub key: SettingKey,
    pub proposed_value: SettingValue,
    pub previous_snapshot: GroupSettings,
    pub previous_source: RecordSource,
    pub started_at: DateTime<Utc>,
}
