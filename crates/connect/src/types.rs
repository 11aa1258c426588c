//! Wire types of the Ledgerdeck service API.

use ledgerdeck_core::settings::{SettingKey, SettingValue};
use serde::{Deserialize, Serialize};

/// Body of `PATCH /api/v1/groups/{id}/settings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingWriteRequest {
    pub key: SettingKey,
    pub value: SettingValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    pub code: String,
    pub message: String,
}
