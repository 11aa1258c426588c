//! API client for the Ledgerdeck service: group settings and sync job status.

use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;

use ledgerdeck_core::settings::{GroupSettings, SettingKey, SettingValue, SettingsRemoteTrait};
use ledgerdeck_core::sync_jobs::SyncEvent;

use crate::config::ConnectConfig;
use crate::error::{ConnectError, Result};
use crate::types::{ApiErrorResponse, SettingWriteRequest};

const MAX_LOG_BODY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct ConnectClient {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl ConnectClient {
    fn log_response(status: StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    pub fn new(config: &ConnectConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.access_token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ConnectError::auth("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        Ok(headers)
    }

    fn group_settings_url(&self, group_id: &str) -> String {
        format!(
            "{}/api/v1/groups/{}/settings",
            self.base_url,
            urlencoding::encode(group_id)
        )
    }

    /// Reads the body, turning non-2xx responses into `ConnectError::Api`.
    async fn read_body(response: reqwest::Response) -> Result<(StatusCode, String)> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(ConnectError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                ));
            }
            return Err(ConnectError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }
        Ok((status, body))
    }

    fn decode_settings(body: &str) -> Result<GroupSettings> {
        GroupSettings::from_json(body).map_err(|e| {
            error!("Failed to decode group settings. Body: {}, Error: {}", body, e);
            ConnectError::invalid_response(format!("Failed to parse settings: {}", e))
        })
    }

    pub async fn get_group_settings(&self, group_id: &str) -> Result<GroupSettings> {
        let url = self.group_settings_url(group_id);
        debug!("GET {}", url);

        let response = self.client.get(&url).headers(self.headers()?).send().await?;
        let (_, body) = Self::read_body(response).await?;
        Self::decode_settings(&body)
    }

    /// Writes one setting. Returns the canonical settings when the service sends
    /// them back, `None` on an empty confirmation.
    pub async fn patch_group_setting(
        &self,
        group_id: &str,
        key: SettingKey,
        value: SettingValue,
    ) -> Result<Option<GroupSettings>> {
        let url = self.group_settings_url(group_id);
        debug!("PATCH {} ({})", url, key);

        let response = self
            .client
            .patch(&url)
            .headers(self.headers()?)
            .json(&SettingWriteRequest { key, value })
            .send()
            .await?;
        let (status, body) = Self::read_body(response).await?;
        if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
            return Ok(None);
        }
        Self::decode_settings(&body).map(Some)
    }

    /// Fetches pending sync job events in the order the service emitted them.
    /// Entries that do not decode are skipped.
    pub async fn fetch_sync_events(&self) -> Result<Vec<SyncEvent>> {
        let url = format!("{}/api/v1/sync/jobs/events", self.base_url);
        debug!("GET {}", url);

        let response = self.client.get(&url).headers(self.headers()?).send().await?;
        let (_, body) = Self::read_body(response).await?;
        let entries: Vec<serde_json::Value> = serde_json::from_str(&body)?;

        let mut events = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<SyncEvent>(entry) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping malformed sync event: {}", e),
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl SettingsRemoteTrait for ConnectClient {
    async fn fetch_settings(&self, entity_id: &str) -> ledgerdeck_core::Result<GroupSettings> {
        Ok(self.get_group_settings(entity_id).await?)
    }

    async fn write_settings(
        &self,
        entity_id: &str,
        key: SettingKey,
        value: SettingValue,
    ) -> ledgerdeck_core::Result<Option<GroupSettings>> {
        Ok(self.patch_group_setting(entity_id, key, value).await?)
    }
}
