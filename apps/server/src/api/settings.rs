//! Group settings endpoints: load, optimistic change, removal.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use ledgerdeck_core::settings::{SettingKey, SettingValue, SettingsRecord};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ApiResult;
use crate::main_lib::AppState;

#[derive(Debug, Deserialize)]
struct SettingChangeRequest {
    key: SettingKey,
    value: SettingValue,
}

async fn get_group_settings(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> ApiResult<Json<SettingsRecord>> {
    let record = state.coordinator.load_entity(&group_id).await?;
    Ok(Json(record))
}

async fn change_group_setting(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    Json(request): Json<SettingChangeRequest>,
) -> ApiResult<Json<SettingsRecord>> {
    if !state.coordinator.is_loaded(&group_id) {
        state.coordinator.load_entity(&group_id).await?;
    }
    debug!("Changing '{}' for group '{}'", request.key, group_id);
    let record = state
        .coordinator
        .propose_setting_change(&group_id, request.key, request.value)
        .await
        .inspect_err(|err| warn!("Setting change for '{}' not applied: {}", group_id, err))?;
    Ok(Json(record))
}

async fn remove_group_settings(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.coordinator.remove_entity(&group_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/groups/{id}/settings",
        get(get_group_settings)
            .patch(change_group_setting)
            .delete(remove_group_settings),
    )
}
